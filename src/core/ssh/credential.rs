//! Private key loading and validation.
//!
//! A key is accepted only once `ssh-keygen` can derive its public half, so
//! malformed or passphrase-protected key material fails here, before any
//! connection is attempted. The OpenSSH client later reads the key by path.

use crate::error::{Error, Result};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const KEYGEN_PROGRAM: &str = "ssh-keygen";

const OPENSSH_MAGIC: &[u8] = b"openssh-key-v1\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    OpenSsh,
    Pkcs1Rsa,
    Sec1Ec,
    Dsa,
    Pkcs8,
}

/// A validated, unencrypted private key ready for public-key authentication.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    pub path: PathBuf,
    pub format: KeyFormat,
    /// SSH algorithm name, e.g. `ssh-ed25519`.
    pub algorithm: String,
    /// `SHA256:<base64>` fingerprint of the public half.
    pub fingerprint: String,
}

impl PrivateKey {
    pub fn describe(&self) -> String {
        format!("{} {}", self.algorithm, self.fingerprint)
    }
}

/// Read and validate the private key at `private_key` for `server_id`.
pub fn load_private_key(server_id: &str, private_key: &str) -> Result<PrivateKey> {
    let path = PathBuf::from(shellexpand::tilde(private_key).to_string());
    let invalid = |problem: String| Error::ssh_key_invalid(server_id, private_key, problem);

    let raw = std::fs::read(&path)
        .map_err(|e| Error::ssh_key_unreadable(server_id, private_key, e.to_string()))?;

    let format = inspect(&raw).map_err(invalid)?;
    let public_key = derive_public_key(&raw, &path)?.map_err(invalid)?;
    let (algorithm, fingerprint) = parse_public_key(&public_key).map_err(invalid)?;

    Ok(PrivateKey {
        path,
        format,
        algorithm,
        fingerprint,
    })
}

/// Cheap checks ahead of `ssh-keygen`: PEM framing, key type and passphrase
/// protection (which `ssh-keygen` would only report as a decode failure).
pub fn inspect(raw: &[u8]) -> std::result::Result<KeyFormat, String> {
    let text = std::str::from_utf8(raw).map_err(|_| "key file is not PEM text".to_string())?;
    let block = PemBlock::find(text)?;

    if block.encrypted {
        return Err(passphrase_unsupported());
    }

    let format = match block.label.as_str() {
        "OPENSSH PRIVATE KEY" => KeyFormat::OpenSsh,
        "RSA PRIVATE KEY" => KeyFormat::Pkcs1Rsa,
        "EC PRIVATE KEY" => KeyFormat::Sec1Ec,
        "DSA PRIVATE KEY" => KeyFormat::Dsa,
        "PRIVATE KEY" => KeyFormat::Pkcs8,
        "ENCRYPTED PRIVATE KEY" => return Err(passphrase_unsupported()),
        other => return Err(format!("unsupported key type \"{}\"", other)),
    };

    if format == KeyFormat::OpenSsh && openssh_cipher(&block.body)? != "none" {
        return Err(passphrase_unsupported());
    }

    Ok(format)
}

fn passphrase_unsupported() -> String {
    "key is protected by a passphrase, which is not supported".to_string()
}

/// Ask `ssh-keygen` for the public half of `raw`.
///
/// The outer `Result` fails only when `ssh-keygen` cannot be run; the inner
/// one carries its complaint about the key.
fn derive_public_key(raw: &[u8], path: &Path) -> Result<std::result::Result<String, String>> {
    let mut cmd = Command::new(KEYGEN_PROGRAM);
    cmd.args(["-y", "-P", ""]);

    // ssh-keygen refuses group-readable key files; a pipe has no such mode.
    #[cfg(unix)]
    cmd.args(["-f", "/dev/stdin"]);
    #[cfg(not(unix))]
    cmd.arg("-f").arg(path);

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::internal_io(
                format!("{}: {}", path.display(), e),
                Some("run ssh-keygen -y".to_string()),
            )
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // A rejected key may close the pipe early; the exit status reports it.
        let _ = stdin.write_all(raw);
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Error::internal_io(e.to_string(), Some("run ssh-keygen -y".to_string())))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Ok(Err(keygen_problem(&stderr)));
    }

    Ok(Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

/// `Load key "/dev/stdin": invalid format` becomes `invalid format`.
fn keygen_problem(stderr: &str) -> String {
    let line = stderr
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("ssh-keygen could not read the key");

    match line.split_once("\": ") {
        Some((prefix, problem)) if prefix.starts_with("Load key") => problem.to_string(),
        _ => line.to_string(),
    }
}

/// Split an `authorized_keys` style line into algorithm and fingerprint.
fn parse_public_key(line: &str) -> std::result::Result<(String, String), String> {
    let mut fields = line.split_whitespace();
    let algorithm = fields
        .next()
        .ok_or_else(|| "ssh-keygen returned no public key".to_string())?;
    let blob = fields
        .next()
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .ok_or_else(|| format!("unexpected public key from ssh-keygen: {}", line))?;

    Ok((algorithm.to_string(), fingerprint(&blob)))
}

/// OpenSSH-style `SHA256:` fingerprint of a public key blob.
pub fn fingerprint(public_blob: &[u8]) -> String {
    let digest = Sha256::digest(public_blob);
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// Cipher name from an `openssh-key-v1` container header.
fn openssh_cipher(body: &str) -> std::result::Result<String, String> {
    let data = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| format!("invalid base64 in OPENSSH PRIVATE KEY block: {}", e))?;
    let rest = data
        .strip_prefix(OPENSSH_MAGIC)
        .ok_or_else(|| "missing openssh-key-v1 header".to_string())?;

    if rest.len() < 4 {
        return Err("truncated key data".to_string());
    }
    let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    let name = rest
        .get(4..4 + len)
        .ok_or_else(|| "truncated key data".to_string())?;

    Ok(String::from_utf8_lossy(name).to_string())
}

struct PemBlock {
    label: String,
    body: String,
    encrypted: bool,
}

impl PemBlock {
    fn find(text: &str) -> std::result::Result<Self, String> {
        let mut lines = text.lines().map(str::trim);

        let label = lines
            .by_ref()
            .find_map(|line| {
                line.strip_prefix("-----BEGIN ")
                    .and_then(|rest| rest.strip_suffix("-----"))
            })
            .ok_or_else(|| "no PEM private key block found".to_string())?
            .to_string();

        if !label.ends_with("PRIVATE KEY") {
            return Err(format!("\"{}\" is not a private key", label));
        }

        let end = format!("-----END {}-----", label);
        let mut body = String::new();
        let mut encrypted = false;
        let mut terminated = false;

        for line in lines {
            if line == end {
                terminated = true;
                break;
            }
            if let Some((header, value)) = line.split_once(':') {
                if header.trim() == "Proc-Type" && value.contains("ENCRYPTED") {
                    encrypted = true;
                }
                continue;
            }
            body.push_str(line);
        }

        if !terminated {
            return Err(format!("missing END line for {} block", label));
        }

        Ok(Self {
            label,
            body,
            encrypted,
        })
    }
}
