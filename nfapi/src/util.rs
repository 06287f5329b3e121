// src/util.rs

//! OS helpers the filtering host needs alongside the driver API.

use crate::status::Result;

#[cfg(windows)]
pub use self::windows::{adjust_process_privileges, process_name};

/// Full image path of process `pid`.
#[cfg(not(windows))]
pub fn process_name(_pid: u32) -> Result<String> {
    Err(crate::status::NfError::Unsupported)
}

/// Enable `SeDebugPrivilege` on the current process token, so
/// [`process_name`] can open processes of other users.
#[cfg(not(windows))]
pub fn adjust_process_privileges() -> Result<()> {
    Err(crate::status::NfError::Unsupported)
}

/// Last path component of a Windows or POSIX image path, lower-cased.
pub fn image_file_name(path: &str) -> String {
    path.rsplit(['\\', '/']).next().unwrap_or(path).to_lowercase()
}

#[cfg(windows)]
mod windows {
    use std::{io, mem, ptr};

    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, LUID};
    use windows_sys::Win32::Security::{
        AdjustTokenPrivileges, LUID_AND_ATTRIBUTES, LookupPrivilegeValueW, SE_PRIVILEGE_ENABLED,
        TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{
        GetCurrentProcess, OpenProcess, OpenProcessToken, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW,
    };

    use super::Result;
    use crate::status::NfError;

    /// Closes the wrapped handle on drop.
    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            unsafe { CloseHandle(self.0) };
        }
    }

    fn os_error(call: &'static str) -> NfError {
        NfError::Os { call, source: io::Error::last_os_error() }
    }

    pub fn process_name(pid: u32) -> Result<String> {
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
        if handle.is_null() {
            return Err(os_error("OpenProcess"));
        }
        let handle = OwnedHandle(handle);

        let mut buf = [0u16; 1024];
        let mut len = buf.len() as u32;
        let ok = unsafe {
            QueryFullProcessImageNameW(handle.0, PROCESS_NAME_WIN32, buf.as_mut_ptr(), &mut len)
        };
        if ok == 0 {
            return Err(os_error("QueryFullProcessImageNameW"));
        }
        Ok(String::from_utf16_lossy(&buf[..len as usize]))
    }

    pub fn adjust_process_privileges() -> Result<()> {
        let mut token: HANDLE = ptr::null_mut();
        let ok = unsafe {
            OpenProcessToken(GetCurrentProcess(), TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY, &mut token)
        };
        if ok == 0 {
            return Err(os_error("OpenProcessToken"));
        }
        let token = OwnedHandle(token);

        let name: Vec<u16> = "SeDebugPrivilege".encode_utf16().chain(Some(0)).collect();
        let mut luid: LUID = unsafe { mem::zeroed() };
        if unsafe { LookupPrivilegeValueW(ptr::null(), name.as_ptr(), &mut luid) } == 0 {
            return Err(os_error("LookupPrivilegeValueW"));
        }

        let privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES { Luid: luid, Attributes: SE_PRIVILEGE_ENABLED }],
        };
        let ok = unsafe {
            AdjustTokenPrivileges(token.0, 0, &privileges, 0, ptr::null_mut(), ptr::null_mut())
        };
        // Succeeds with ERROR_NOT_ALL_ASSIGNED when the account lacks the right.
        let err = io::Error::last_os_error();
        if ok == 0 || err.raw_os_error() == Some(1300) {
            return Err(NfError::Os { call: "AdjustTokenPrivileges", source: err });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_file_name_handles_both_separators() {
        assert_eq!(image_file_name(r"C:\Program Files\Foo\FOO.exe"), "foo.exe");
        assert_eq!(image_file_name("/usr/bin/curl"), "curl");
        assert_eq!(image_file_name("svchost.exe"), "svchost.exe");
    }

    #[cfg(not(windows))]
    #[test]
    fn helpers_are_unsupported_elsewhere() {
        assert!(matches!(process_name(4), Err(crate::status::NfError::Unsupported)));
        assert!(adjust_process_privileges().is_err());
    }
}
