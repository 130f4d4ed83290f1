//! OpenVPN configuration and static key files
//!
//! Each vpn owns two files in the server configuration directory:
//! `<name>.conf` and `hil-vpn-<name>.key`. The key file doubles as the
//! inventory marker that `list` reports.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::warn;

use hil_vpn_proto::{Vlan, VpnName};

/// Directory the `openvpn-server@` units read their configuration from
pub const CONFIG_DIR: &str = "/etc/openvpn/server";

const KEY_PREFIX: &str = "hil-vpn-";
const KEY_SUFFIX: &str = ".key";

pub fn key_file_name(name: &VpnName) -> String {
    format!("{}{}{}", KEY_PREFIX, name, KEY_SUFFIX)
}

pub fn config_path(dir: &Path, name: &VpnName) -> PathBuf {
    dir.join(format!("{}.conf", name))
}

pub fn key_path(dir: &Path, name: &VpnName) -> PathBuf {
    dir.join(key_file_name(name))
}

/// The vpn a directory entry belongs to, if it is a key file with a valid
/// vpn name.
pub fn parse_key_file_name(file_name: &str) -> Option<VpnName> {
    let name = file_name
        .strip_prefix(KEY_PREFIX)?
        .strip_suffix(KEY_SUFFIX)?;
    VpnName::parse(name).ok()
}

/// Server configuration for one vpn
pub fn render_config(name: &VpnName, vlan: Vlan) -> String {
    format!(
        "# {name}\n\
         # vlan {vlan}\n\
         port {port}\n\
         proto udp\n\
         dev tap\n\
         secret {key}\n\
         user nobody\n\
         group nobody\n\
         persist-key\n\
         persist-tun\n",
        name = name,
        vlan = vlan,
        port = name.port(),
        key = key_file_name(name),
    )
}

/// Write the configuration and key for `name`, refusing to replace either
/// file. Nothing is left behind if any step fails.
pub fn save(dir: &Path, name: &VpnName, config: &str, key: &str) -> io::Result<()> {
    let cfg_path = config_path(dir, name);
    let key_path = key_path(dir, name);

    write_new(&cfg_path, config)?;
    if let Err(e) = write_new(&key_path, key) {
        discard(&cfg_path);
        return Err(e);
    }
    Ok(())
}

/// Exclusive-create `path` with mode 0600 and fill it
fn write_new(path: &Path, contents: &str) -> io::Result<()> {
    let mut file: File = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;

    let written = file
        .write_all(contents.as_bytes())
        .and_then(|()| file.sync_all());
    if let Err(e) = written {
        drop(file);
        discard(path);
        return Err(e);
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove partially written file");
    }
}

/// Names of every vpn with a key file in `dir`, sorted
pub fn scan(dir: &Path) -> io::Result<Vec<VpnName>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str().and_then(parse_key_file_name) {
            names.push(name);
        }
    }
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hil_vpn_proto::UniqueId;
    use std::os::unix::fs::PermissionsExt;

    fn name(port: u16) -> VpnName {
        VpnName::new(UniqueId::generate(), port)
    }

    #[test]
    fn test_render_config() {
        let name = name(5000);
        let config = render_config(&name, Vlan::new(232).unwrap());

        let lines: Vec<_> = config.lines().collect();
        assert!(lines.contains(&"# vlan 232"));
        assert!(lines.contains(&"port 5000"));
        assert!(lines.contains(&"dev tap"));
        assert!(lines.contains(&format!("secret hil-vpn-{}.key", name).as_str()));
        assert!(lines.contains(&"user nobody"));
        assert!(lines.contains(&"group nobody"));
    }

    #[test]
    fn test_save_writes_private_files() {
        let dir = tempfile::tempdir().unwrap();
        let name = name(5000);

        save(dir.path(), &name, "config\n", "key\n").unwrap();

        for (path, contents) in [
            (config_path(dir.path(), &name), "config\n"),
            (key_path(dir.path(), &name), "key\n"),
        ] {
            assert_eq!(fs::read_to_string(&path).unwrap(), contents);
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_save_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let name = name(5000);

        save(dir.path(), &name, "first", "first-key").unwrap();
        let err = save(dir.path(), &name, "second", "second-key").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        assert_eq!(
            fs::read_to_string(config_path(dir.path(), &name)).unwrap(),
            "first"
        );
        assert_eq!(
            fs::read_to_string(key_path(dir.path(), &name)).unwrap(),
            "first-key"
        );
    }

    #[test]
    fn test_save_cleans_up_when_key_exists() {
        let dir = tempfile::tempdir().unwrap();
        let name = name(5000);
        fs::write(key_path(dir.path(), &name), "stale").unwrap();

        assert!(save(dir.path(), &name, "config", "key").is_err());

        // The config written first is removed again; the stale key is untouched.
        assert!(!config_path(dir.path(), &name).exists());
        assert_eq!(
            fs::read_to_string(key_path(dir.path(), &name)).unwrap(),
            "stale"
        );
    }

    #[test]
    fn test_parse_key_file_name() {
        let name = name(5000);
        assert_eq!(parse_key_file_name(&key_file_name(&name)), Some(name.clone()));

        let junk = [
            "server.conf".to_string(),
            "hil-vpn-.key".to_string(),
            "hil-vpn-foo.key".to_string(),
            format!("{}.conf", name),
            format!("hil-vpn-{}.key.bak", name),
            format!("hil-vpn-{}.KEY", name),
            format!("xhil-vpn-{}.key", name),
        ];
        for junk in &junk {
            assert_eq!(parse_key_file_name(junk), None, "{}", junk);
        }
    }

    #[test]
    fn test_scan_lists_only_vpn_keys() {
        let dir = tempfile::tempdir().unwrap();
        let a = name(5000);
        let b = name(5001);
        save(dir.path(), &a, "a", "a").unwrap();
        save(dir.path(), &b, "b", "b").unwrap();

        fs::write(dir.path().join("server.conf"), "").unwrap();
        fs::write(dir.path().join("hil-vpn-unrelated.key"), "").unwrap();
        fs::write(dir.path().join("hil-vpn-id_zz_port_1.key"), "").unwrap();

        let mut expected = vec![a, b];
        expected.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(scan(dir.path()).unwrap(), expected);
    }
}
