//! Thread naming helper, used by every long-lived worker thread (capture,
//! detection tick, notification pool, evidence committer) so `top`/`gdb`
//! show something other than `woofalytics-0`.

#[cfg(unix)]
pub fn set_name(name: &str) {
    use std::ffi::CString;

    // pthread_setname_np truncates at 15 bytes on Linux; trim defensively
    // rather than letting the CString construction fail on interior NULs.
    let trimmed: String = name.chars().take(15).collect();

    let Ok(cstr) = CString::new(trimmed) else {
        return;
    };

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
    }
}

#[cfg(not(unix))]
pub fn set_name(_name: &str) {}

/// Spawn a named, joinable thread. Every real-time worker in this workspace
/// goes through here so thread names are consistent without repeating the
/// naming boilerplate everywhere.
pub fn start<F>(name: &'static str, f: F) -> std::thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            set_name(name);
            f();
        })
        .expect("failed to spawn thread")
}
