//! Binary persistence of pattern trees.
//!
//! The writer walks the graph once per canonical node. The first visit of a
//! node emits its full record; every later visit emits a back-reference to
//! the position of that record. This keeps shared subtrees from being
//! written twice and terminates on the cycles of the build graph.
//!
//! # Format
//!
//! All integers are big-endian.
//!
//! ```text
//! header   magic "TSPT" | version u16 | params_len u32 | params (CBOR)
//!          | params fingerprint [u8; 32] | pattern count u32 | index width u8
//! record   tag u8 | body
//! tag      0x80 if a node body follows, low bits = LinkType
//! new      bins of layers 1.. as u16 (layer 0 is always 0) | child count u16
//!          followed by the child records
//! repeat   index of the first visit, `index width` bytes
//! ```
//!
//! The first record is the root (tag `0x80`). Records appear in pre-order, so
//! a reader rebuilds the tree with an explicit stack of pending child counts.
//! Output of a failed write is incomplete and must be discarded.

use crate::arena::PatternId;
use crate::config::TreeParams;
use crate::fingerprint::{Canonicalizable, HashValue};
use crate::pattern::{Bin, Link, LinkType, Pattern};
use crate::tree::PatternTree;
use crate::walk::{PatternGraph, TreeWalk, WalkOp, WalkOutcome};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// File magic.
pub const MAGIC: [u8; 4] = *b"TSPT";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Tag bit marking a record with a node body.
const NEW_NODE: u8 = 0x80;

/// Upper bound on the encoded parameter block.
const MAX_PARAMS_LEN: usize = 1 << 16;

/// Patterns reserved up front; larger trees grow while reading.
const MAX_PREALLOCATED: usize = 1 << 16;

/// Width of back-reference indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    /// One byte, for fewer than 2^8 patterns.
    U8,
    /// Two bytes, for fewer than 2^16 patterns.
    U16,
    /// Four bytes.
    U32,
}

impl IndexWidth {
    /// Narrowest width able to address `count` patterns.
    pub fn for_count(count: usize) -> Self {
        if count < 1 << 8 {
            IndexWidth::U8
        } else if count < 1 << 16 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    /// Size in bytes.
    pub fn bytes(self) -> u8 {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }

    fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(IndexWidth::U8),
            2 => Some(IndexWidth::U16),
            4 => Some(IndexWidth::U32),
            _ => None,
        }
    }

    fn write<W: Write>(self, out: &mut W, index: u32) -> io::Result<()> {
        // for_count guarantees the index fits
        match self {
            IndexWidth::U8 => out.write_all(&[index as u8]),
            IndexWidth::U16 => out.write_all(&(index as u16).to_be_bytes()),
            IndexWidth::U32 => out.write_all(&index.to_be_bytes()),
        }
    }

    fn read<R: Read>(self, input: &mut R) -> io::Result<u32> {
        Ok(match self {
            IndexWidth::U8 => u32::from(read_u8(input)?),
            IndexWidth::U16 => u32::from(read_u16(input)?),
            IndexWidth::U32 => read_u32(input)?,
        })
    }
}

/// Error type for tree persistence.
#[derive(Debug)]
pub enum TreeIoError {
    /// Underlying read or write failed.
    Io(io::Error),
    /// Input does not start with `MAGIC`.
    BadMagic([u8; 4]),
    /// Format version not supported by this reader.
    UnsupportedVersion(u16),
    /// Header present but malformed.
    Header(String),
    /// Tag byte with an unknown transform.
    BadTag(u8),
    /// Back-reference to a pattern not read yet.
    DanglingReference(u32),
    /// Node records inconsistent with the header.
    Corrupt(String),
    /// Parameter block does not match its fingerprint.
    FingerprintMismatch {
        /// Fingerprint stored in the header.
        stored: HashValue,
        /// Fingerprint of the stored parameters.
        computed: HashValue,
    },
    /// Tree was generated for other parameters than requested.
    ParamsMismatch,
    /// A node has more children than a record can hold.
    ChildCountOverflow(usize),
}

impl std::fmt::Display for TreeIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeIoError::Io(e) => write!(f, "tree i/o error: {}", e),
            TreeIoError::BadMagic(m) => write!(f, "not a pattern tree (magic {:02x?})", m),
            TreeIoError::UnsupportedVersion(v) => {
                write!(f, "unsupported tree format version {} (expected {})", v, FORMAT_VERSION)
            }
            TreeIoError::Header(msg) => write!(f, "malformed tree header: {}", msg),
            TreeIoError::BadTag(t) => write!(f, "bad record tag {:#04x}", t),
            TreeIoError::DanglingReference(i) => write!(f, "reference to unknown pattern {}", i),
            TreeIoError::Corrupt(msg) => write!(f, "corrupt tree: {}", msg),
            TreeIoError::FingerprintMismatch { stored, computed } => write!(
                f,
                "parameter fingerprint mismatch: stored {}, computed {}",
                stored, computed
            ),
            TreeIoError::ParamsMismatch => write!(f, "tree was generated for other parameters"),
            TreeIoError::ChildCountOverflow(n) => write!(f, "{} children exceed record limit", n),
        }
    }
}

impl std::error::Error for TreeIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TreeIoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TreeIoError {
    fn from(e: io::Error) -> Self {
        TreeIoError::Io(e)
    }
}

/// Writes a frozen tree. Returns the number of patterns written.
///
/// Frozen trees carry the parameters they were generated for, so header and
/// records always agree. Build graphs are not written directly:
///
/// ```compile_fail
/// use treesearch::serialize::write_graph;
/// ```
pub fn write_tree<W: Write>(tree: &PatternTree, out: &mut W) -> Result<usize, TreeIoError> {
    write_graph(tree, tree.params(), out)
}

/// Writes a pattern graph generated for `params`.
///
/// `graph` must hold a root and must have been generated for exactly
/// `params`. Returns the number of patterns written.
pub(crate) fn write_graph<G, W>(graph: &G, params: &TreeParams, out: &mut W) -> Result<usize, TreeIoError>
where
    G: PatternGraph + ?Sized,
    W: Write,
{
    let walk = TreeWalk::new(params.max_depth + 1);
    let count = count_patterns(graph, &walk);
    let width = IndexWidth::for_count(count);
    let mut out = CountingWriter::new(out);
    write_header(&mut out, params, count, width)?;

    // Serialization order of each node, rebuilt for every pass
    let mut order: HashMap<PatternId, u32> = HashMap::with_capacity(count);
    let mut failure: Option<TreeIoError> = None;
    let outcome = walk.walk(graph, |nd, pattern| {
        let result = match order.get(&nd.id()) {
            Some(&index) => write_reference(&mut out, nd.link.kind, index, width).map(|_| false),
            None => {
                order.insert(nd.id(), order.len() as u32);
                let nchildren = graph.children(nd.id()).len();
                write_node(&mut out, nd.link.kind, pattern, nchildren).map(|_| true)
            }
        };
        match result {
            Ok(true) => WalkOp::RecurseUnconditionally,
            Ok(false) => WalkOp::SkipChildren,
            Err(e) => {
                failure = Some(e);
                WalkOp::Abort
            }
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    debug_assert_eq!(outcome, WalkOutcome::Completed);
    out.flush()?;
    debug!("wrote pattern tree: {} patterns, {} bytes", count, out.written);
    Ok(count)
}

fn count_patterns<G: PatternGraph + ?Sized>(graph: &G, walk: &TreeWalk) -> usize {
    let mut seen = HashSet::new();
    walk.walk(graph, |nd, _| {
        if seen.insert(nd.id()) {
            WalkOp::RecurseUnconditionally
        } else {
            WalkOp::SkipChildren
        }
    });
    seen.len()
}

fn write_header<W: Write>(
    out: &mut W,
    params: &TreeParams,
    count: usize,
    width: IndexWidth,
) -> Result<(), TreeIoError> {
    let cbor = params
        .to_cbor()
        .map_err(|e| TreeIoError::Header(format!("cannot encode parameters: {}", e)))?;
    let cbor_len = u32::try_from(cbor.len())
        .map_err(|_| TreeIoError::Header("parameter block too large".to_string()))?;
    let count = u32::try_from(count)
        .map_err(|_| TreeIoError::Header(format!("{} patterns exceed format limit", count)))?;
    out.write_all(&MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_be_bytes())?;
    out.write_all(&cbor_len.to_be_bytes())?;
    out.write_all(&cbor)?;
    out.write_all(params.fingerprint().as_bytes())?;
    out.write_all(&count.to_be_bytes())?;
    out.write_all(&[width.bytes()])?;
    Ok(())
}

fn write_node<W: Write>(
    out: &mut W,
    kind: LinkType,
    pattern: &Pattern,
    nchildren: usize,
) -> Result<(), TreeIoError> {
    let nchildren =
        u16::try_from(nchildren).map_err(|_| TreeIoError::ChildCountOverflow(nchildren))?;
    out.write_all(&[kind.tag() | NEW_NODE])?;
    for bin in &pattern.bits()[1..] {
        out.write_all(&bin.to_be_bytes())?;
    }
    out.write_all(&nchildren.to_be_bytes())?;
    Ok(())
}

fn write_reference<W: Write>(
    out: &mut W,
    kind: LinkType,
    index: u32,
    width: IndexWidth,
) -> Result<(), TreeIoError> {
    out.write_all(&[kind.tag()])?;
    width.write(out, index)?;
    Ok(())
}

struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    written: u64,
}

impl<'a, W: Write> CountingWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads a tree written by `write_tree`.
pub fn read_tree<R: Read>(input: &mut R) -> Result<PatternTree, TreeIoError> {
    let header = read_header(input)?;
    let nlayers = header.params.nlayers();
    let count = header.count as usize;
    let mut tree = PatternTree::with_capacity(header.params, count.min(MAX_PREALLOCATED));

    let tag = read_u8(input)?;
    if tag != NEW_NODE | LinkType::Plain.tag() {
        return Err(TreeIoError::BadTag(tag));
    }
    let (pattern, nchildren) = read_node_body(input, nlayers)?;
    if pattern != Pattern::root(nlayers) {
        return Err(TreeIoError::Corrupt(format!("root pattern {}", pattern)));
    }
    let root = tree.push_node(pattern);

    // (parent, children still to read, depth of the children)
    let mut pending: Vec<(PatternId, u16, u32)> = Vec::new();
    if nchildren > 0 {
        pending.push((root, nchildren, 1));
    }
    while let Some(top) = pending.last_mut() {
        let (parent, depth) = (top.0, top.2);
        top.1 -= 1;
        if top.1 == 0 {
            pending.pop();
        }

        let tag = read_u8(input)?;
        let kind = LinkType::from_tag(tag & !NEW_NODE).ok_or(TreeIoError::BadTag(tag))?;
        if tag & NEW_NODE != 0 {
            if tree.len() >= count {
                return Err(TreeIoError::Corrupt(format!(
                    "more than the declared {} patterns",
                    count
                )));
            }
            let (pattern, nchildren) = read_node_body(input, nlayers)?;
            check_pattern(&pattern, depth)?;
            let id = tree.push_node(pattern);
            tree.push_link(parent, Link::new(id, kind));
            if nchildren > 0 {
                pending.push((id, nchildren, depth + 1));
            }
        } else {
            let index = header.width.read(input)?;
            if index as usize >= tree.len() {
                return Err(TreeIoError::DanglingReference(index));
            }
            let id = PatternId::new(index);
            check_pattern(tree.pattern(id), depth)?;
            tree.push_link(parent, Link::new(id, kind));
        }
    }

    if tree.len() != count {
        return Err(TreeIoError::Corrupt(format!(
            "read {} patterns, header declares {}",
            tree.len(),
            count
        )));
    }
    debug!("read pattern tree: {} patterns, {} links", tree.len(), tree.n_links());
    Ok(tree)
}

/// Reads a tree and checks that it was generated for `expected`.
pub fn read_tree_checked<R: Read>(
    input: &mut R,
    expected: &TreeParams,
) -> Result<PatternTree, TreeIoError> {
    let tree = read_tree(input)?;
    if tree.params() != expected {
        warn!(
            "rejecting pattern tree: generated for {:?}, expected {:?}",
            tree.params(),
            expected
        );
        return Err(TreeIoError::ParamsMismatch);
    }
    Ok(tree)
}

/// Saves a frozen tree to a file. Returns the number of patterns written.
///
/// The tree is written next to `path` and renamed into place once complete,
/// so a failed save leaves no file behind and keeps an existing one intact.
pub fn save_tree(tree: &PatternTree, path: &Path) -> Result<usize, TreeIoError> {
    save_with(path, |out| write_tree(tree, out))
}

fn save_with<F>(path: &Path, write: F) -> Result<usize, TreeIoError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<usize, TreeIoError>,
{
    let partial = partial_path(path);
    let result = File::create(&partial)
        .map_err(TreeIoError::from)
        .and_then(|file| {
            let mut out = BufWriter::new(file);
            let count = write(&mut out)?;
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            Ok(count)
        })
        .and_then(|count| {
            fs::rename(&partial, path)?;
            Ok(count)
        });
    if let Err(e) = &result {
        warn!("discarding incomplete pattern tree {}: {}", partial.display(), e);
        let _ = fs::remove_file(&partial);
    }
    result
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Loads a tree saved by `save_tree`.
pub fn load_tree(path: &Path) -> Result<PatternTree, TreeIoError> {
    let mut input = BufReader::new(File::open(path)?);
    read_tree(&mut input)
}

struct Header {
    params: TreeParams,
    count: u32,
    width: IndexWidth,
}

fn read_header<R: Read>(input: &mut R) -> Result<Header, TreeIoError> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(TreeIoError::BadMagic(magic));
    }
    let version = read_u16(input)?;
    if version != FORMAT_VERSION {
        return Err(TreeIoError::UnsupportedVersion(version));
    }
    let cbor_len = read_u32(input)? as usize;
    if cbor_len > MAX_PARAMS_LEN {
        return Err(TreeIoError::Header(format!("parameter block of {} bytes", cbor_len)));
    }
    let mut cbor = vec![0u8; cbor_len];
    input.read_exact(&mut cbor)?;
    let params = TreeParams::from_cbor(&cbor)
        .map_err(|e| TreeIoError::Header(format!("cannot decode parameters: {}", e)))?;
    params
        .normalize()
        .map_err(|e| TreeIoError::Header(format!("invalid parameters: {}", e)))?;

    let mut stored = [0u8; 32];
    input.read_exact(&mut stored)?;
    let stored = HashValue::from_bytes(stored);
    let computed = params.fingerprint();
    if stored != computed {
        return Err(TreeIoError::FingerprintMismatch { stored, computed });
    }

    let count = read_u32(input)?;
    if count == 0 {
        return Err(TreeIoError::Header("empty tree".to_string()));
    }
    let width_bytes = read_u8(input)?;
    let width = IndexWidth::from_bytes(width_bytes)
        .ok_or_else(|| TreeIoError::Header(format!("index width {}", width_bytes)))?;
    Ok(Header {
        params,
        count,
        width,
    })
}

/// Rejects a pattern that is not canonical or does not fit `depth`.
fn check_pattern(pattern: &Pattern, depth: u32) -> Result<(), TreeIoError> {
    let bins = pattern.bits();
    let last = bins[bins.len() - 1];
    if bins.iter().any(|&b| b > last) {
        return Err(TreeIoError::Corrupt(format!("pattern {} is not canonical", pattern)));
    }
    let nbins = 1u64.checked_shl(depth).unwrap_or(u64::MAX);
    if u64::from(last) >= nbins {
        return Err(TreeIoError::Corrupt(format!(
            "pattern {} exceeds {} bins at depth {}",
            pattern, nbins, depth
        )));
    }
    Ok(())
}

fn read_node_body<R: Read>(input: &mut R, nlayers: usize) -> Result<(Pattern, u16), TreeIoError> {
    let mut bits: Vec<Bin> = Vec::with_capacity(nlayers);
    bits.push(0);
    for _ in 1..nlayers {
        bits.push(read_u16(input)?);
    }
    let nchildren = read_u16(input)?;
    Ok((Pattern::from_bits(bits), nchildren))
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(input: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}
