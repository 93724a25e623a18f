//! Positioned reads and writes that leave the file cursor alone.
//!
//! Buffers are passed as raw pointer + length so the blocking closures that
//! wrap these calls can be `'static`; callers keep the buffer alive across
//! the await.

#[cfg(unix)]
pub use unix::{file_size, pread, pwrite, set_times_now};
#[cfg(windows)]
pub use windows::{file_size, pread, pwrite, set_times_now};

#[cfg(unix)]
mod unix {
    use std::ffi::CString;
    use std::fs::File;
    use std::io::{Error, ErrorKind, Result};
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    pub fn pread(file: &File, pos: u64, len: usize, ptr: u64) -> Result<usize> {
        check_err_size(unsafe {
            libc::pread(
                file.as_raw_fd(),
                ptr as *mut _,
                len as libc::size_t,
                pos as libc::off_t,
            )
        })
    }

    pub fn pwrite(file: &File, pos: u64, len: usize, ptr: u64) -> Result<usize> {
        check_err_size(unsafe {
            libc::pwrite(
                file.as_raw_fd(),
                ptr as *const _,
                len as libc::size_t,
                pos as libc::off_t,
            )
        })
    }

    pub fn file_size(file: &File) -> Result<u64> {
        let mut stat = MaybeUninit::<libc::stat>::zeroed();
        check_err(unsafe { libc::fstat(file.as_raw_fd(), stat.as_mut_ptr()) })?;
        let stat = unsafe { stat.assume_init() };
        Ok(stat.st_size as u64)
    }

    /// Sets atime and mtime of `path` to now.
    pub fn set_times_now(path: &Path) -> Result<()> {
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| Error::new(ErrorKind::InvalidInput, e))?;
        check_err(unsafe { libc::utimes(cpath.as_ptr(), std::ptr::null()) })?;
        Ok(())
    }

    fn check_err(r: libc::c_int) -> Result<libc::c_int> {
        if r == -1 {
            Err(Error::last_os_error())
        } else {
            Ok(r)
        }
    }

    fn check_err_size(e: libc::ssize_t) -> Result<usize> {
        if e == -1_isize {
            Err(Error::last_os_error())
        } else {
            Ok(e as usize)
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::fs::File;
    use std::io::Result;
    use std::os::windows::fs::FileExt;
    use std::path::Path;

    pub fn pread(file: &File, pos: u64, len: usize, ptr: u64) -> Result<usize> {
        let buf = unsafe { std::slice::from_raw_parts_mut(ptr as *mut u8, len) };
        file.seek_read(buf, pos)
    }

    pub fn pwrite(file: &File, pos: u64, len: usize, ptr: u64) -> Result<usize> {
        let buf = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
        file.seek_write(buf, pos)
    }

    pub fn file_size(file: &File) -> Result<u64> {
        Ok(file.metadata()?.len())
    }

    // The rename itself carries the recovery information; the mtime bump is
    // unix-only.
    pub fn set_times_now(_path: &Path) -> Result<()> {
        Ok(())
    }
}
