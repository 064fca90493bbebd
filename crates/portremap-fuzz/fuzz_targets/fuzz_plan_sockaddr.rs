#![no_main]
use libfuzzer_sys::fuzz_target;
use portremap_core::redirect::{BindRoute, plan_sockaddr, rule_for};
use portremap_core::socket::{SOCKADDR_IN_LEN, port_of};

fuzz_target!(|data: &[u8]| {
    // First byte picks addrlen, second splits the rest into address and
    // override value.
    let [len_byte, split, rest @ ..] = data else {
        return;
    };
    let split = usize::from(*split).min(rest.len());
    let (addr, value) = rest.split_at(split);
    let addrlen = usize::from(*len_byte);
    let view = &addr[..addr.len().min(addrlen).min(SOCKADDR_IN_LEN)];

    let route = plan_sockaddr(view, addrlen, |_| Some(value));
    if let BindRoute::Redirect(directive) = route {
        let sin: &[u8; SOCKADDR_IN_LEN] = view.try_into().expect("redirect needs a full sockaddr_in");
        assert_eq!(port_of(sin), directive.original_port);
        assert!(rule_for(directive.original_port).is_some());
        assert_ne!(directive.replacement_port, 0);
    }
});
