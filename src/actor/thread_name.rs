//! Reactor thread naming.

/// Longest thread name the Linux kernel keeps, excluding the terminator.
#[cfg(target_os = "linux")]
const MAX_THREAD_NAME_LEN: usize = 15;

/// Derive a thread name from a dispatch name.
///
/// Interior NULs are removed; on Linux the result is cut to 15 bytes at a
/// character boundary.
pub(super) fn thread_name(name: &str) -> String {
    #[cfg_attr(
        not(target_os = "linux"),
        expect(unused_mut, reason = "only truncated on Linux")
    )]
    let mut name: String = name.chars().filter(|&c| c != '\0').collect();
    #[cfg(target_os = "linux")]
    if name.len() > MAX_THREAD_NAME_LEN {
        let mut end = MAX_THREAD_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}
