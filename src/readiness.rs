use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

/// Wait until at least one of `fds` becomes readable.
///
/// * `timeout`
///   If the value is `None`, wait indefinitely.
///
/// Returns a flag per descriptor, in the order of `fds`.
/// A descriptor whose peer has hung up or which has a pending error counts as readable,
/// the next read on it reports the condition.
/// All flags are `false` on timeout or when the wait was interrupted by a signal.
pub fn wait_readable<const N: usize>(
    fds: [RawFd; N],
    timeout: Option<Duration>,
) -> io::Result<[bool; N]> {
    let mut pollfds = fds.map(|fd| PollFd::new(fd, PollFlags::POLLIN));
    match poll(&mut pollfds, timeout_millis(timeout)) {
        Ok(0) | Err(Errno::EINTR) => Ok([false; N]),
        Ok(_) => Ok(pollfds.map(|pfd| {
            pfd.revents().map_or(false, |ev| {
                ev.intersects(
                    PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL,
                )
            })
        })),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Convert timeout to milliseconds for poll(2); `-1` is infinite
fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(dur) => {
            // round up so a sub-millisecond timeout does not become a busy loop
            let millis = dur.as_micros().saturating_add(999) / 1000;
            millis.try_into().unwrap_or(libc::c_int::MAX)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    #[test]
    fn timeout_conversion() {
        assert_eq!(timeout_millis(None), -1);
        assert_eq!(timeout_millis(Some(Duration::from_millis(0))), 0);
        assert_eq!(timeout_millis(Some(Duration::from_micros(10))), 1);
        assert_eq!(timeout_millis(Some(Duration::from_secs(3))), 3000);
        assert_eq!(
            timeout_millis(Some(Duration::from_secs(u64::MAX))),
            libc::c_int::MAX
        );
    }

    #[test]
    fn times_out_without_data() {
        let (a, _b) = UnixStream::pair().unwrap();
        let start = Instant::now();
        let ready = wait_readable([a.as_raw_fd()], Some(Duration::from_millis(50))).unwrap();
        assert_eq!(ready, [false]);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn reports_readable_side() {
        let (a, mut a_peer) = UnixStream::pair().unwrap();
        let (b, b_peer) = UnixStream::pair().unwrap();
        a_peer.write_all(b"x").unwrap();
        let ready = wait_readable([a.as_raw_fd(), b.as_raw_fd()], None).unwrap();
        assert_eq!(ready, [true, false]);

        // hang up counts as readable
        drop(b_peer);
        let ready = wait_readable([b.as_raw_fd()], Some(Duration::from_secs(1))).unwrap();
        assert_eq!(ready, [true]);
    }
}
