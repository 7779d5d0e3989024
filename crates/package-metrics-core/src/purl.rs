//! Package URL ("purl") parsing and canonicalization.
//!
//! A package URL identifies a software package independent of the registry
//! that hosts it:
//!
//! ```text
//! pkg:type/namespace/name@version?qualifiers#subpath
//! ```
//!
//! Parsing percent-decodes every component and applies the per-type
//! normalization rules, so two spellings of the same coordinate produce equal
//! [`PackageUrl`] values. [`PackageUrl`]'s `Display` implementation emits the
//! canonical string, which is what the storage layer uses as a partition key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The input could not be parsed as a package URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed package url '{input}': {reason}")]
pub struct MalformedIdentifier {
    pub input: String,
    pub reason: String,
}

/// A parsed, canonical package URL. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageUrl {
    package_type: String,
    namespace: Option<String>,
    name: String,
    version: Option<String>,
    qualifiers: BTreeMap<String, String>,
    subpath: Option<String>,
}

impl PackageUrl {
    /// Parse a package URL string into its canonical form.
    pub fn parse(input: &str) -> Result<Self, MalformedIdentifier> {
        let fail = |reason: &str| MalformedIdentifier {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let decode = |s: &str| percent_decode(s).ok_or_else(|| fail("invalid percent-encoding"));

        let input_trimmed = input.trim();

        // Subpath
        let (rest, subpath) = match input_trimmed.rsplit_once('#') {
            Some((rest, raw)) => {
                let mut segments = Vec::new();
                for seg in raw.trim_matches('/').split('/') {
                    if seg.is_empty() || seg == "." || seg == ".." {
                        continue;
                    }
                    segments.push(decode(seg)?);
                }
                let subpath = (!segments.is_empty()).then(|| segments.join("/"));
                (rest, subpath)
            }
            None => (input_trimmed, None),
        };

        // Qualifiers
        let (rest, qualifiers) = match rest.rsplit_once('?') {
            Some((rest, raw)) => (rest, parse_qualifiers(raw, &fail)?),
            None => (rest, BTreeMap::new()),
        };

        // Scheme
        let (scheme, rest) = rest.split_once(':').ok_or_else(|| fail("missing 'pkg:' scheme"))?;
        if !scheme.eq_ignore_ascii_case("pkg") {
            return Err(fail("scheme must be 'pkg'"));
        }
        let rest = rest.trim_matches('/');

        // Type
        let (raw_type, rest) = rest
            .split_once('/')
            .ok_or_else(|| fail("missing package name"))?;
        let package_type = raw_type.to_ascii_lowercase();
        if !is_valid_type(&package_type) {
            return Err(fail("invalid package type"));
        }

        // Version lives in the last path segment
        let (path, version) = {
            let last_slash = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
            match rest[last_slash..].rfind('@') {
                Some(at) => {
                    let at = last_slash + at;
                    let raw_version = &rest[at + 1..];
                    if raw_version.is_empty() {
                        return Err(fail("empty version after '@'"));
                    }
                    (&rest[..at], Some(decode(raw_version)?))
                }
                None => (rest, None),
            }
        };

        // Name and namespace
        let path = path.trim_matches('/');
        let (raw_namespace, raw_name) = match path.rsplit_once('/') {
            Some((ns, name)) => (Some(ns), name),
            None => (None, path),
        };
        let mut name = decode(raw_name)?;
        if name.is_empty() {
            return Err(fail("missing package name"));
        }
        let mut namespace = match raw_namespace {
            Some(raw) => {
                let mut segments = Vec::new();
                for seg in raw.split('/').filter(|s| !s.is_empty()) {
                    segments.push(decode(seg)?);
                }
                (!segments.is_empty()).then(|| segments.join("/"))
            }
            None => None,
        };

        match package_type.as_str() {
            "bitbucket" | "github" | "gitlab" => {
                namespace = namespace.map(|ns| ns.to_lowercase());
                name = name.to_lowercase();
            }
            "pypi" => {
                namespace = namespace.map(|ns| ns.to_lowercase());
                name = name.to_lowercase().replace('_', "-");
            }
            _ => {}
        }

        Ok(Self {
            package_type,
            namespace,
            name,
            version,
            qualifiers,
            subpath,
        })
    }

    /// Package type (ecosystem), e.g. `npm`, `pypi`, `maven`.
    pub fn package_type(&self) -> &str {
        &self.package_type
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn qualifiers(&self) -> &BTreeMap<String, String> {
        &self.qualifiers
    }

    pub fn subpath(&self) -> Option<&str> {
        self.subpath.as_deref()
    }
}

impl FromStr for PackageUrl {
    type Err = MalformedIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/", self.package_type)?;
        if let Some(namespace) = &self.namespace {
            for seg in namespace.split('/') {
                write!(f, "{}/", percent_encode(seg))?;
            }
        }
        f.write_str(&percent_encode(&self.name))?;
        if let Some(version) = &self.version {
            write!(f, "@{}", percent_encode(version))?;
        }
        if !self.qualifiers.is_empty() {
            let joined = self
                .qualifiers
                .iter()
                .map(|(k, v)| format!("{}={}", k, percent_encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            write!(f, "?{}", joined)?;
        }
        if let Some(subpath) = &self.subpath {
            let encoded = subpath
                .split('/')
                .map(percent_encode)
                .collect::<Vec<_>>()
                .join("/");
            write!(f, "#{}", encoded)?;
        }
        Ok(())
    }
}

fn parse_qualifiers(
    raw: &str,
    fail: &impl Fn(&str) -> MalformedIdentifier,
) -> Result<BTreeMap<String, String>, MalformedIdentifier> {
    let mut qualifiers = BTreeMap::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| fail("qualifier without '='"))?;
        let key = key.to_ascii_lowercase();
        if !is_valid_qualifier_key(&key) {
            return Err(fail("invalid qualifier key"));
        }
        let value = percent_decode(value).ok_or_else(|| fail("invalid percent-encoding"))?;
        if value.is_empty() {
            continue;
        }
        if qualifiers.insert(key, value).is_some() {
            return Err(fail("duplicate qualifier key"));
        }
    }
    Ok(qualifiers)
}

fn is_valid_type(t: &str) -> bool {
    let mut chars = t.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
}

fn is_valid_qualifier_key(k: &str) -> bool {
    let mut chars = k.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Decode `%XX` escapes. Returns `None` if the result is not valid UTF-8.
/// A `%` that does not start a valid escape is kept literally.
fn percent_decode(s: &str) -> Option<String> {
    urlencoding::decode(s).ok().map(|decoded| decoded.into_owned())
}

/// Encode everything outside the unreserved set, keeping `:` literal.
fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).replace("%3A", ":")
}
