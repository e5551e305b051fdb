use clap::{Parser, ValueEnum};

/// An SMB1/CIFS file server.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
    /// TCP port; 445 needs privileges, so the default is the direct-host
    /// port used for testing.
    #[arg(short, long, default_value_t = 4450)]
    pub port: u16,

    /// Exported share as NAME:PATH[:ro][:guest]; repeatable.
    #[arg(long, value_parser = parse_share)]
    pub share: Vec<ShareSpec>,

    /// Account as NAME[:UID[:GID]]; repeatable.
    #[arg(long, value_parser = parse_user)]
    pub user: Vec<UserSpec>,

    /// Message signing policy.
    #[arg(long, value_enum, default_value_t = SigningMode::Auto)]
    pub signing: SigningMode,

    /// Map unknown accounts to the guest account.
    #[arg(long)]
    pub map_bad_user_to_guest: bool,

    /// Keep DOS attributes and creation times in xattrs.
    #[arg(long)]
    pub store_dos_attrs: bool,

    #[arg(long, default_value = "smbd-rs")]
    pub server_string: String,
    #[arg(long, default_value = "WORKGROUP")]
    pub workgroup: String,
    #[arg(long, default_value = "SMBD")]
    pub netbios_name: String,
}

#[derive(ValueEnum, Copy, Clone, Debug)]
pub enum SigningMode {
    Disable,
    Auto,
    Mandatory,
}

#[derive(Clone, Debug)]
pub struct ShareSpec {
    pub name: String,
    pub path: String,
    pub read_only: bool,
    pub guest_ok: bool,
}

fn parse_share(value: &str) -> Result<ShareSpec, String> {
    let mut parts = value.split(':');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or("share name is empty")?;
    let path = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or("share path is empty")?;
    let mut spec = ShareSpec {
        name: name.to_string(),
        path: path.to_string(),
        read_only: false,
        guest_ok: false,
    };
    for flag in parts {
        match flag {
            "ro" => spec.read_only = true,
            "guest" => spec.guest_ok = true,
            other => return Err(format!("unknown share flag {other:?}")),
        }
    }
    Ok(spec)
}

#[derive(Clone, Debug)]
pub struct UserSpec {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

fn parse_user(value: &str) -> Result<UserSpec, String> {
    let mut parts = value.split(':');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or("user name is empty")?;
    let uid = parts
        .next()
        .map(|s| s.parse().map_err(|e| format!("bad uid: {e}")))
        .transpose()?
        .unwrap_or(65534);
    let gid = parts
        .next()
        .map(|s| s.parse().map_err(|e| format!("bad gid: {e}")))
        .transpose()?
        .unwrap_or(uid);
    Ok(UserSpec {
        name: name.to_string(),
        uid,
        gid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_share() {
        let spec = parse_share("public:/srv/public:ro:guest").unwrap();
        assert_eq!(spec.name, "public");
        assert!(spec.read_only);
        assert!(spec.guest_ok);
        assert!(parse_share("nopath").is_err());
    }

    #[test]
    fn test_parse_user() {
        let spec = parse_user("alice:1000").unwrap();
        assert_eq!((spec.uid, spec.gid), (1000, 1000));
    }
}
