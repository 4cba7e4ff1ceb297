use core::fmt;
use core::fmt::Write;

/// Writes straight to the stderr file descriptor.
///
/// No locks, no buffering, no allocation: usable while the process is
/// dying, before the runtime is initialized, or when memory is exhausted.
pub struct LibCStderrWriter;

impl Write for LibCStderrWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut bytes = s.as_bytes();
        while !bytes.is_empty() {
            // SAFETY: the pointer and length describe the live `bytes`.
            let r = unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
            if r < 0 {
                if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(fmt::Error);
            }
            if r == 0 {
                return Err(fmt::Error);
            }
            bytes = &bytes[(r as usize)..];
        }
        Ok(())
    }
}
