use log::{debug, warn};
use std::sync::Once;

static ELEVATION_HINT: Once = Once::new();

pub struct Privilege;

impl Privilege {
    /// Check if we're running as root
    #[cfg(unix)]
    pub fn is_elevated() -> bool {
        nix::unistd::geteuid().is_root()
    }

    /// Check if the process token is elevated (UAC "Run as administrator")
    #[cfg(windows)]
    pub fn is_elevated() -> bool {
        use windows::Win32::Foundation::{CloseHandle, HANDLE};
        use windows::Win32::Security::{
            GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation,
        };
        use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        let mut token = HANDLE::default();
        if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) }.is_err() {
            return false;
        }

        let mut elevation = TOKEN_ELEVATION::default();
        let mut size = 0u32;
        let queried = unsafe {
            GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut TOKEN_ELEVATION as *mut _),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut size,
            )
        };
        let _ = unsafe { CloseHandle(token) };

        queried.is_ok() && elevation.TokenIsElevated != 0
    }

    /// Tell the user once that elevated privileges may help with denied
    /// priority or affinity changes.
    pub fn hint_elevation() {
        if Self::is_elevated() {
            debug!("Already running with elevated privileges");
            return;
        }

        ELEVATION_HINT.call_once(|| {
            if cfg!(windows) {
                warn!("Not running elevated; try \"Run as administrator\"");
            } else {
                warn!("Not running with elevated privileges; try running as root (e.g. via sudo)");
            }
        });
    }
}
