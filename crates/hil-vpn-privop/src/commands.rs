//! What each helper subcommand does to the host
//!
//! Callers hand in a validated [`Request`] and hold the instance lock for the
//! whole call. External programs are run through absolute, allow-listed
//! paths with a cleared environment.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, info};

use hil_vpn_proto::{Vlan, VpnName};

use crate::error::HelperError;
use crate::openvpn::{self, CONFIG_DIR};
use crate::request::Request;
use crate::resolver::{self, SAFE_PATH};

const OPENVPN: &str = "openvpn";
const SYSTEMCTL: &str = "systemctl";
/// `systemctl is-active` exit status for a unit that is not running
const UNIT_INACTIVE: i32 = 3;

/// systemd unit that runs the server for `name`
pub fn unit_name(name: &VpnName) -> String {
    format!("openvpn-server@{}.service", name)
}

pub struct Helper {
    config_dir: PathBuf,
    /// Stand-in executables for tests
    #[cfg(test)]
    tool_dir: Option<PathBuf>,
}

impl Helper {
    pub fn new() -> Self {
        Self {
            config_dir: PathBuf::from(CONFIG_DIR),
            #[cfg(test)]
            tool_dir: None,
        }
    }

    #[cfg(test)]
    fn with_dirs(config_dir: impl Into<PathBuf>, tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            tool_dir: Some(tool_dir.into()),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Carry out `request`, returning what belongs on stdout
    pub fn run(&self, request: &Request) -> Result<String, HelperError> {
        match request {
            Request::Create { name, vlan, port } => self.create(name, *vlan, *port),
            Request::Start(name) => self.start(name).map(|()| String::new()),
            Request::Stop(name) => self.stop(name).map(|()| String::new()),
            Request::Delete(name) => self.delete(name).map(|()| String::new()),
            Request::List => Ok(self
                .list()?
                .iter()
                .map(|name| format!("{}\n", name))
                .collect()),
        }
    }

    /// Generate a key, persist config and key, return the key
    pub fn create(&self, name: &VpnName, vlan: Vlan, port: u16) -> Result<String, HelperError> {
        if let Some(other) = self.list()?.into_iter().find(|other| other.port() == port) {
            return Err(HelperError::PortInUse {
                port,
                other: other.to_string(),
            });
        }

        let key = self.generate_key()?;
        let config = openvpn::render_config(name, vlan);
        openvpn::save(&self.config_dir, name, &config, &key).map_err(|source| {
            HelperError::Io {
                action: "saving openvpn config in",
                path: self.config_dir.clone(),
                source,
            }
        })?;

        info!(vpn = %name, %vlan, port, "Created vpn");
        Ok(key)
    }

    pub fn start(&self, name: &VpnName) -> Result<(), HelperError> {
        let config = openvpn::config_path(&self.config_dir, name);
        if !config.exists() {
            return Err(HelperError::NoSuchVpn(name.to_string()));
        }
        self.systemctl(&["enable", "--now", &unit_name(name)])?;
        info!(vpn = %name, "Started vpn");
        Ok(())
    }

    pub fn stop(&self, name: &VpnName) -> Result<(), HelperError> {
        self.systemctl(&["disable", "--now", &unit_name(name)])?;
        info!(vpn = %name, "Stopped vpn");
        Ok(())
    }

    /// Remove the key and config of a vpn whose service is not active
    pub fn delete(&self, name: &VpnName) -> Result<(), HelperError> {
        if self.is_active(name)? {
            return Err(HelperError::StillRunning(name.to_string()));
        }

        let mut removed = false;
        for path in [
            openvpn::key_path(&self.config_dir, name),
            openvpn::config_path(&self.config_dir, name),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Already absent");
                }
                Err(source) => {
                    return Err(HelperError::Io {
                        action: "removing",
                        path,
                        source,
                    })
                }
            }
        }

        if !removed {
            return Err(HelperError::NoSuchVpn(name.to_string()));
        }
        info!(vpn = %name, "Deleted vpn");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<VpnName>, HelperError> {
        openvpn::scan(&self.config_dir).map_err(|source| HelperError::Io {
            action: "scanning",
            path: self.config_dir.clone(),
            source,
        })
    }

    fn generate_key(&self) -> Result<String, HelperError> {
        let (program, output) = self.run_tool(OPENVPN, &["--genkey", "--secret", "/dev/fd/1"])?;
        let output = check_status(program, output)?;
        String::from_utf8(output.stdout).map_err(|_| HelperError::InvalidKey)
    }

    fn systemctl(&self, args: &[&str]) -> Result<(), HelperError> {
        let (program, output) = self.run_tool(SYSTEMCTL, args)?;
        check_status(program, output).map(drop)
    }

    /// Only an explicit "inactive" answer counts as stopped; any other
    /// failure to query systemd is an error.
    fn is_active(&self, name: &VpnName) -> Result<bool, HelperError> {
        let (program, output) =
            self.run_tool(SYSTEMCTL, &["is-active", "--quiet", &unit_name(name)])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(UNIT_INACTIVE) => Ok(false),
            _ => check_status(program, output).map(|_| true),
        }
    }

    fn tool(&self, name: &str) -> Result<PathBuf, HelperError> {
        #[cfg(test)]
        if let Some(dir) = &self.tool_dir {
            return Ok(dir.join(name));
        }
        Ok(resolver::resolve(name)?)
    }

    fn run_tool(&self, name: &str, args: &[&str]) -> Result<(PathBuf, Output), HelperError> {
        let program = self.tool(name)?;
        debug!(program = %program.display(), ?args, "Running");

        let output = Command::new(&program)
            .args(args)
            .env_clear()
            .env("PATH", SAFE_PATH)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| HelperError::Spawn {
                program: program.clone(),
                source,
            })?;
        Ok((program, output))
    }
}

impl Default for Helper {
    fn default() -> Self {
        Self::new()
    }
}

fn check_status(program: PathBuf, output: Output) -> Result<Output, HelperError> {
    if output.status.success() {
        return Ok(output);
    }
    Err(HelperError::CommandFailed {
        program,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
