//! Hostname lookup for evidence provenance (`DeviceSummary::hostname`).

#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = vec![0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if ret != 0 {
        return "unknown".to_string();
    }
    let nul = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..nul]).into_owned()
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    "unknown".to_string()
}
