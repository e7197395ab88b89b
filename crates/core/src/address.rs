//! Virtual address parsing
//!
//! Addresses have the form `scheme://account.host/container/seg1/.../leaf`.
//! A trailing `/` names a container, its absence names a blob. Only the
//! scheme and authority are case-normalized; path segments are kept as is.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// What an address is expected to resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Container,
    Blob,
}

/// A parsed virtual address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAddress {
    /// Lower-cased scheme, e.g. `https`
    pub scheme: String,
    /// Lower-cased host, e.g. `acct.blob.example.net`
    pub host: String,
    /// First label of the host
    pub account: String,
    /// Root-level (real) container name
    pub container: String,
    /// Virtual directory segments below the container
    pub segments: Vec<String>,
    /// Blob name, present only in blob mode
    pub leaf: Option<String>,
}

/// Scheme and account part of an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAddress {
    /// Lower-cased scheme, e.g. `https`
    pub scheme: String,
    /// Lower-cased host, e.g. `acct.blob.example.net`
    pub host: String,
    /// First label of the host
    pub account: String,
}

impl AccountAddress {
    /// Parse the `scheme://host` part of `input`, returning it together with
    /// the path that follows the host's `/` (possibly empty)
    pub fn split(input: &str) -> Result<(Self, &str)> {
        let malformed = |reason: &str| Error::MalformedAddress(format!("{input}: {reason}"));

        let Some((scheme, rest)) = input.split_once("://") else {
            return Err(malformed("missing scheme"));
        };
        if scheme.is_empty() {
            return Err(malformed("missing scheme"));
        }

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return Err(malformed("missing account host"));
        }

        // Opaque hosts of non-special schemes keep their case in `Url`.
        let authority = authority.to_ascii_lowercase();
        let base = Url::parse(&format!("{scheme}://{authority}/"))
            .map_err(|e| malformed(&e.to_string()))?;
        let host = base
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| malformed("missing account host"))?
            .to_string();
        let account = host.split('.').next().unwrap_or_default().to_string();

        Ok((
            Self {
                scheme: base.scheme().to_string(),
                host,
                account,
            },
            path,
        ))
    }
}

impl VirtualAddress {
    /// Parse `input`, requiring the trailing delimiter to agree with `mode`
    pub fn parse(input: &str, mode: ResolveMode) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedAddress(format!("{input}: {reason}"));
        let (AccountAddress { scheme, host, account }, path) = AccountAddress::split(input)?;

        let trailing = path.ends_with('/');
        match (mode, trailing) {
            (ResolveMode::Container, false) => {
                return Err(malformed("container address must end with '/'"));
            }
            (ResolveMode::Blob, true) => {
                return Err(malformed("blob address must not end with '/'"));
            }
            _ => {}
        }

        let trimmed = path.strip_suffix('/').unwrap_or(path);
        let mut parts: Vec<String> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').map(str::to_string).collect()
        };
        if parts.iter().any(String::is_empty) {
            return Err(malformed("empty path segment"));
        }
        if parts.is_empty() {
            return Err(malformed("missing container name"));
        }

        let container = parts.remove(0);
        let leaf = match mode {
            ResolveMode::Container => None,
            ResolveMode::Blob => match parts.pop() {
                Some(leaf) => Some(leaf),
                None => return Err(malformed("missing blob name")),
            },
        };

        Ok(Self {
            scheme,
            host,
            account,
            container,
            segments: parts,
            leaf,
        })
    }

    /// Whether this address names a container
    pub fn is_container(&self) -> bool {
        self.leaf.is_none()
    }

    /// Key prefix of the virtual directory: `seg1/seg2/`, or empty
    pub fn prefix(&self) -> String {
        self.segments.iter().map(|s| format!("{s}/")).collect()
    }

    /// Full backend key of the blob, if this is a blob address
    pub fn key(&self) -> Option<String> {
        self.leaf.as_ref().map(|leaf| format!("{}{leaf}", self.prefix()))
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}/{}", self.scheme, self.host, self.container, self.prefix())?;
        if let Some(leaf) = &self.leaf {
            f.write_str(leaf)?;
        }
        Ok(())
    }
}
