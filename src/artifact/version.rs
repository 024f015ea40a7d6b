//! Tag version parsing
//!
//! Tags are parsed leniently as semantic versions: an optional `v` prefix, one or more
//! numeric segments (padded to three), an optional pre-release and optional build
//! metadata. Anything that does not parse, and anything that looks like a bare content
//! hash, becomes [`ArtifactVersion::Unparsed`].

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static HASH_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[0-9a-f]{4,}$").expect("hash pattern is valid"));

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^v?(?P<segments>[0-9]+(?:\.[0-9]+)*)",
        r"(?:-(?P<pre>[0-9A-Za-z\-~]+(?:\.[0-9A-Za-z\-~]+)*)",
        r"|(?P<bare_pre>[A-Za-z~][0-9A-Za-z\-~]*(?:\.[0-9A-Za-z\-~]+)*))?",
        r"(?:\+(?P<meta>[0-9A-Za-z\-~]+(?:\.[0-9A-Za-z\-~]+)*))?$",
    ))
    .expect("version pattern is valid")
});

/// A parsed semantic version
#[derive(Debug, Clone)]
pub struct Version {
    segments: Vec<u64>,
    pre: Option<String>,
    metadata: Option<String>,
}

impl Version {
    /// Parse a version string, returning `None` when it is not a version.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = VERSION.captures(raw)?;

        let mut segments = caps["segments"]
            .split('.')
            .map(|s| s.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        while segments.len() < 3 {
            segments.push(0);
        }

        let pre = caps
            .name("pre")
            .or_else(|| caps.name("bare_pre"))
            .map(|m| m.as_str().to_string());
        let metadata = caps.name("meta").map(|m| m.as_str().to_string());

        Some(Self {
            segments,
            pre,
            metadata,
        })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn prerelease(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    fn zero() -> Self {
        Self {
            segments: vec![0, 0, 0],
            pre: None,
            metadata: None,
        }
    }
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.segments.len().max(other.segments.len());
        for i in 0..width {
            let l = self.segments.get(i).copied().unwrap_or(0);
            let r = other.segments.get(i).copied().unwrap_or(0);
            match l.cmp(&r) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }

        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => compare_prerelease(l, r),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Build metadata does not take part in equality, matching the ordering above.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments = self
            .segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{}", segments)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        if let Some(meta) = &self.metadata {
            write!(f, "+{}", meta)?;
        }
        Ok(())
    }
}

/// Version derived from a tag.
///
/// `Unparsed` orders and prints like `0.0.0` but never compares equal to a real
/// `0.0.0` tag; it sorts just below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactVersion {
    Parsed(Version),
    Unparsed,
}

impl ArtifactVersion {
    pub fn is_unparsed(&self) -> bool {
        matches!(self, ArtifactVersion::Unparsed)
    }

    pub fn as_parsed(&self) -> Option<&Version> {
        match self {
            ArtifactVersion::Parsed(v) => Some(v),
            ArtifactVersion::Unparsed => None,
        }
    }
}

impl Ord for ArtifactVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ArtifactVersion::Parsed(l), ArtifactVersion::Parsed(r)) => l.cmp(r),
            (ArtifactVersion::Unparsed, ArtifactVersion::Unparsed) => Ordering::Equal,
            (ArtifactVersion::Unparsed, ArtifactVersion::Parsed(r)) => {
                Version::zero().cmp(r).then(Ordering::Less)
            }
            (ArtifactVersion::Parsed(l), ArtifactVersion::Unparsed) => {
                l.cmp(&Version::zero()).then(Ordering::Greater)
            }
        }
    }
}

impl PartialOrd for ArtifactVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactVersion::Parsed(v) => write!(f, "{}", v),
            ArtifactVersion::Unparsed => write!(f, "0.0.0"),
        }
    }
}

/// Whether a tag is a bare hex string such as a git commit sha.
pub fn is_hash_like(tag: &str) -> bool {
    HASH_LIKE.is_match(tag)
}

/// Derive a version from a tag. Never fails; unusable tags degrade to `Unparsed`.
pub fn parse_version(tag: &str) -> ArtifactVersion {
    if is_hash_like(tag) {
        return ArtifactVersion::Unparsed;
    }
    match Version::parse(tag) {
        Some(v) => ArtifactVersion::Parsed(v),
        None => ArtifactVersion::Unparsed,
    }
}
