use std::{io, mem, time};

/// `setsockopt` wrapper
///
/// The libc `setsockopt` function is set to set various options on a socket.
/// `set_socket_option` offers a somewhat type-safe wrapper that does not
/// require messing around with `*const c_void`s.
///
/// A proper `std::io::Error` will be returned on failure.
///
/// Note that the `val` parameter must be specified correctly; if an option
/// expects an integer, it is advisable to pass in a `c_int`, not the default
/// of `i32`.
pub fn set_socket_option<T>(fd: libc::c_int,
                            level: libc::c_int,
                            name: libc::c_int,
                            val: &T) -> io::Result<()> {
    let r = unsafe {
        let val_ptr: *const T = val as *const T;
        libc::setsockopt(fd,
                         level,
                         name,
                         val_ptr as *const libc::c_void,
                         mem::size_of::<T>() as libc::socklen_t)
    };

    if r != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Convert a receive timeout into a `timeval` for `SO_RCVTIMEO`.
///
/// A zero `timeval` means "block forever" to the kernel, so anything shorter
/// than a microsecond is rounded up to one.
pub fn timeval_from_duration(t: time::Duration) -> libc::timeval {
    let t = t.max(time::Duration::from_micros(1));
    libc::timeval {
        tv_sec: t.as_secs() as libc::time_t,
        tv_usec: (t.subsec_micros()) as libc::suseconds_t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeval_splits_seconds_and_micros() {
        let tv = timeval_from_duration(Duration::from_millis(1250));
        assert_eq!(tv.tv_sec, 1);
        assert_eq!(tv.tv_usec, 250_000);
    }

    #[test]
    fn zero_timeout_never_blocks_forever() {
        let tv = timeval_from_duration(Duration::ZERO);
        assert_eq!(tv.tv_sec, 0);
        assert_eq!(tv.tv_usec, 1);
    }
}
