//! External tier actions.
//!
//! Mounting a tier root, bringing up the network, and applying a committed
//! tier (production reboots; tests re-enter the boot controller) are all
//! external collaborators behind one facade.

use std::path::PathBuf;
use std::process::Command;

use pac_error::{PacError, Result};
use pac_types::Tier;
use tracing::{info, warn};

/// The external actions a tier transition needs.
pub trait TierActions {
    /// Mount the tier-specific root filesystem.
    fn mount_tier_root(&mut self, tier: Tier) -> Result<()>;

    /// Bring up networking for Tier 2 and above.
    fn setup_network(&mut self) -> Result<()>;

    /// Request a tier-apply event so the committed tier's root is mounted
    /// from scratch. Production implementations reboot.
    fn request_reboot(&mut self, target: Tier) -> Result<()>;
}

/// Actions delegated to configured helper programs.
///
/// A helper left unset is a no-op success, which keeps bring-up usable on
/// hosts where the initramfs already did the work.
#[derive(Debug, Clone, Default)]
pub struct CommandActions {
    /// Invoked as `<helper> <tier>`.
    pub mount_helper: Option<PathBuf>,
    /// Invoked with no arguments.
    pub network_helper: Option<PathBuf>,
    /// Invoked as `<helper> <tier>`; typically a reboot wrapper.
    pub reboot_helper: Option<PathBuf>,
}

impl CommandActions {
    fn run_helper(helper: &PathBuf, arg: Option<&str>, what: &str) -> Result<()> {
        let mut command = Command::new(helper);
        if let Some(arg) = arg {
            command.arg(arg);
        }
        let status = command.status()?;
        if status.success() {
            Ok(())
        } else {
            warn!(helper = %helper.display(), %status, "{what} helper failed");
            Err(PacError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{what} helper exited with {status}"),
            )))
        }
    }
}

impl TierActions for CommandActions {
    fn mount_tier_root(&mut self, tier: Tier) -> Result<()> {
        match &self.mount_helper {
            Some(helper) => {
                let tier_arg = tier.to_string();
                Self::run_helper(helper, Some(&tier_arg), "tier-root mount")
            }
            None => {
                info!(%tier, "no mount helper configured, assuming root is mounted");
                Ok(())
            }
        }
    }

    fn setup_network(&mut self) -> Result<()> {
        match &self.network_helper {
            Some(helper) => Self::run_helper(helper, None, "network setup"),
            None => Ok(()),
        }
    }

    fn request_reboot(&mut self, target: Tier) -> Result<()> {
        info!(%target, "requesting reboot to apply tier root");
        match &self.reboot_helper {
            Some(helper) => {
                let target_arg = target.to_string();
                Self::run_helper(helper, Some(&target_arg), "reboot")
            }
            None => Ok(()),
        }
    }
}

/// Test double: records every call, with scriptable failures.
#[derive(Debug, Default)]
pub struct RecordingActions {
    pub mounted: Vec<Tier>,
    pub network_setups: u32,
    pub reboot_requests: Vec<Tier>,
    /// Mounting this tier fails.
    pub fail_mount: Option<Tier>,
    /// Network setup fails.
    pub fail_network: bool,
}

impl RecordingActions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TierActions for RecordingActions {
    fn mount_tier_root(&mut self, tier: Tier) -> Result<()> {
        if self.fail_mount == Some(tier) {
            return Err(PacError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("mount of tier {tier} root failed"),
            )));
        }
        self.mounted.push(tier);
        Ok(())
    }

    fn setup_network(&mut self) -> Result<()> {
        if self.fail_network {
            return Err(PacError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "network setup failed",
            )));
        }
        self.network_setups += 1;
        Ok(())
    }

    fn request_reboot(&mut self, target: Tier) -> Result<()> {
        self.reboot_requests.push(target);
        Ok(())
    }
}
