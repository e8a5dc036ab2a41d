cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        pub(crate) mod epoll;
        pub(crate) use epoll::EpolledSelector as SysSelector;
    } else if #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))] {
        pub(crate) mod kqueue;
        pub(crate) use kqueue::KqueuedSelector as SysSelector;
    } else {
        compile_error!("no readiness poller backend for this platform");
    }
}
