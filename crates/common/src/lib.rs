use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod config;
pub mod error;

pub use config::FlockConfig;
pub use error::{FlockError, FlockResult};

/// Play time assumed for a segment whose filename carries no duration field.
pub const DEFAULT_SEGMENT_SECS: u64 = 5;

/// Separator between the integer fields of a segment filename.
pub const DESCRIPTOR_SEPARATOR: char = '=';

/// Identity of a segment: unique within the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub generation: u64,
    pub identity: u64,
}

impl SegmentKey {
    pub fn new(generation: u64, identity: u64) -> Self {
        Self {
            generation,
            identity,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.identity)
    }
}

/// A graph node. Nodes of different generations never connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub generation: u64,
    pub node: u64,
}

impl NodeKey {
    pub fn new(generation: u64, node: u64) -> Self {
        Self { generation, node }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.node)
    }
}

/// One pre-rendered, playable media unit.
///
/// Equality and hashing only look at `(generation, identity)`, so two
/// descriptions of the same segment with refreshed metadata collide in any
/// set or map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    location: PathBuf,
    generation: u64,
    identity: u64,
    start_node: u64,
    end_node: u64,
    duration: Duration,
}

impl Segment {
    pub fn new(
        location: impl Into<PathBuf>,
        generation: u64,
        identity: u64,
        start_node: u64,
        end_node: u64,
    ) -> Self {
        Self {
            location: location.into(),
            generation,
            identity,
            start_node,
            end_node,
            duration: Duration::from_secs(DEFAULT_SEGMENT_SECS),
        }
    }

    /// Overrides the play time. Zero durations are rejected by the parser,
    /// callers building segments by hand must keep it positive.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Decode a segment from its filename, `gen=ident=start=end[=secs].ext`.
    ///
    /// Relative paths are made absolute against the current directory so
    /// later existence checks do not depend on the process working directory.
    pub fn from_path(path: impl AsRef<Path>) -> FlockResult<Self> {
        let path = path.as_ref();
        let location = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| FlockError::malformed(path, "file name is not valid UTF-8"))?;

        let fields = stem
            .split(DESCRIPTOR_SEPARATOR)
            .map(|field| {
                field.parse::<u64>().map_err(|err| {
                    FlockError::malformed(path, format!("field `{field}` is not an integer: {err}"))
                })
            })
            .collect::<FlockResult<Vec<u64>>>()?;

        match fields.as_slice() {
            [generation, identity, start, end] => Ok(Self::new(
                location,
                *generation,
                *identity,
                *start,
                *end,
            )),
            [_, _, _, _, 0] => Err(FlockError::malformed(path, "duration must be positive")),
            [generation, identity, start, end, secs] => {
                Ok(Self::new(location, *generation, *identity, *start, *end)
                    .with_duration(Duration::from_secs(*secs)))
            }
            other => Err(FlockError::malformed(
                path,
                format!("expected 4 or 5 `=`-separated fields, found {}", other.len()),
            )),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn identity(&self) -> u64 {
        self.identity
    }

    pub fn start_node(&self) -> u64 {
        self.start_node
    }

    pub fn end_node(&self) -> u64 {
        self.end_node
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.generation, self.identity)
    }

    /// Node this segment leaves from.
    pub fn origin(&self) -> NodeKey {
        NodeKey::new(self.generation, self.start_node)
    }

    /// Node this segment arrives at; its successors leave from here.
    pub fn destination(&self) -> NodeKey {
        NodeKey::new(self.generation, self.end_node)
    }

    /// A loop starts and ends on its own node and can repeat forever.
    pub fn is_loop(&self) -> bool {
        self.identity == self.start_node && self.start_node == self.end_node
    }

    /// Final path component, used to build media URLs.
    pub fn file_name(&self) -> Option<&str> {
        self.location.file_name().and_then(|name| name.to_str())
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
