use std::{iter, num::ParseIntError};

use itertools::Itertools;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{map, value},
    error::{FromExternalError, ParseError},
    sequence::{preceded, separated_pair},
    IResult,
};
use thiserror::Error;
use tracing::{debug, trace, warn};
use util::{parse_nice, parse_number, InputError, Span};

pub const TOTAL_SIZE: u64 = 70_000_000;
pub const SPACE_NEEDED: u64 = 30_000_000;
pub const THRESHOLD: u64 = 100_000;

/// Disk geometry and the cut-off used by the two queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskConfig {
    pub total_size: u64,
    pub space_needed: u64,
    pub threshold: u64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            total_size: TOTAL_SIZE,
            space_needed: SPACE_NEEDED,
            threshold: THRESHOLD,
        }
    }
}

impl DiskConfig {
    pub fn with_total_size(mut self, total_size: u64) -> Self {
        self.total_size = total_size;
        self
    }

    pub fn with_space_needed(mut self, space_needed: u64) -> Self {
        self.space_needed = space_needed;
        self
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("malformed transcript line {line_no}")]
    Malformed {
        line_no: usize,
        #[source]
        source: InputError,
    },
    #[error("unable to cd into {name}: no such directory in {cwd}")]
    UnknownDirectory { name: String, cwd: String },
    #[error("unable to cd into {name}: it is a file in {cwd}")]
    NotADirectory { name: String, cwd: String },
    #[error("no directory is large enough to free {clear_at_least}")]
    NoCandidate { clear_at_least: i128 },
    #[error("size of {path} does not fit in 64 bits")]
    SizeOverflow { path: String },
    #[error("sum of directories at most {threshold} does not fit in 64 bits")]
    BoundedTotalOverflow { threshold: u64 },
}

/// One classified transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    CdUp,
    CdRoot,
    CdInto(String),
    Ls,
    DirEntry(String),
    FileEntry { name: String, size: u64 },
}

fn parse_name<'a, E>(i: Span<'a>) -> IResult<Span<'a>, Span<'a>, E>
where
    E: ParseError<Span<'a>>,
{
    take_while1(|c: char| !c.is_whitespace())(i)
}

fn parse_cd<'a, E>(i: Span<'a>) -> IResult<Span<'a>, Line, E>
where
    E: ParseError<Span<'a>>,
{
    map(preceded(tag("$ cd "), parse_name), |target: Span<'a>| {
        match *target.fragment() {
            ".." => Line::CdUp,
            "/" => Line::CdRoot,
            name => Line::CdInto(name.to_string()),
        }
    })(i)
}

fn parse_line<'a, E>(i: Span<'a>) -> IResult<Span<'a>, Line, E>
where
    E: ParseError<Span<'a>> + FromExternalError<Span<'a>, ParseIntError>,
{
    alt((
        parse_cd,
        value(Line::Ls, tag("$ ls")),
        map(preceded(tag("dir "), parse_name), |name: Span<'a>| {
            Line::DirEntry(name.fragment().to_string())
        }),
        map(
            separated_pair(parse_number, char(' '), parse_name),
            |(size, name): (u64, Span<'a>)| Line::FileEntry {
                name: name.fragment().to_string(),
                size,
            },
        ),
    ))(i)
}

impl Line {
    pub fn classify(l: &str) -> Result<Self, InputError> {
        parse_nice(l, parse_line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirId(usize);

impl DirId {
    pub const ROOT: DirId = DirId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl Default for DirId {
    fn default() -> Self {
        DirId::ROOT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    parent: DirId,
    size: u64,
}

impl File {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> DirId {
        self.parent
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Dir(DirId),
    File(File),
}

#[derive(Debug, Clone)]
pub struct Directory {
    name: String,
    parent: Option<DirId>,
    contents: Vec<Entry>,
}

impl Directory {
    fn new(name: String, parent: Option<DirId>) -> Self {
        Self {
            name,
            parent,
            contents: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<DirId> {
        self.parent
    }

    pub fn contents(&self) -> &[Entry] {
        &self.contents
    }

    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.contents.iter().filter_map(|e| match e {
            Entry::File(f) => Some(f),
            Entry::Dir(_) => None,
        })
    }

    pub fn subdirs(&self) -> impl Iterator<Item = DirId> + '_ {
        self.contents.iter().filter_map(|e| match e {
            Entry::Dir(id) => Some(*id),
            Entry::File(_) => None,
        })
    }
}

/// Arena of every directory seen in a transcript. The root is always
/// [`DirId::ROOT`] and a directory is always stored after its parent.
#[derive(Debug, Clone)]
pub struct Filesystem {
    dirs: Vec<Directory>,
}

impl Default for Filesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem {
    pub fn new() -> Self {
        Self {
            dirs: vec![Directory::new("/".to_string(), None)],
        }
    }

    /// Builds the tree from a whole transcript.
    pub fn parse(input: &str) -> Result<Self, TreeError> {
        input
            .trim_end()
            .lines()
            .enumerate()
            .map(|(i, l)| {
                Line::classify(l).map_err(|source| TreeError::Malformed {
                    line_no: i + 1,
                    source,
                })
            })
            .try_fold(Builder::new(), |builder, line| builder.step(line?))
            .map(Builder::finish)
    }

    pub fn root(&self) -> DirId {
        DirId::ROOT
    }

    /// Panics if `id` was not handed out by this filesystem.
    pub fn dir(&self, id: DirId) -> &Directory {
        &self.dirs[id.0]
    }

    /// Every directory in creation order, root first.
    pub fn dirs(&self) -> impl Iterator<Item = (DirId, &Directory)> {
        self.dirs.iter().enumerate().map(|(i, d)| (DirId(i), d))
    }

    /// Number of directories, root included.
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn parent(&self, id: DirId) -> Option<DirId> {
        self.dir(id).parent
    }

    pub fn entry_name<'a>(&'a self, entry: &'a Entry) -> &'a str {
        match entry {
            Entry::Dir(id) => self.dir(*id).name(),
            Entry::File(f) => f.name(),
        }
    }

    pub fn find_child(&self, id: DirId, name: &str) -> Option<&Entry> {
        self.dir(id)
            .contents
            .iter()
            .find(|e| self.entry_name(e) == name)
    }

    pub fn child_dir(&self, id: DirId, name: &str) -> Option<DirId> {
        match self.find_child(id, name) {
            Some(Entry::Dir(child)) => Some(*child),
            _ => None,
        }
    }

    pub fn path(&self, id: DirId) -> String {
        let names = iter::successors(Some(id), |&d| self.parent(d))
            .filter(|&d| d != DirId::ROOT)
            .map(|d| self.dir(d).name())
            .collect::<Vec<_>>();

        format!("/{}", names.into_iter().rev().join("/"))
    }

    fn add_dir(&mut self, parent: DirId, name: &str) -> Option<DirId> {
        if self.find_child(parent, name).is_some() {
            return None;
        }

        let id = DirId(self.dirs.len());
        self.dirs.push(Directory::new(name.to_string(), Some(parent)));
        self.dirs[parent.0].contents.push(Entry::Dir(id));

        Some(id)
    }

    fn add_file(&mut self, parent: DirId, name: &str, size: u64) -> bool {
        if self.find_child(parent, name).is_some() {
            return false;
        }

        self.dirs[parent.0].contents.push(Entry::File(File {
            name: name.to_string(),
            parent,
            size,
        }));

        true
    }

    fn overflow(&self, id: DirId) -> TreeError {
        TreeError::SizeOverflow {
            path: self.path(id),
        }
    }

    /// Total size of every file below `id`.
    pub fn size_of(&self, id: DirId) -> Result<u64, TreeError> {
        self.dir(id).contents.iter().try_fold(0u64, |total, e| {
            let size = match e {
                Entry::File(f) => f.size,
                Entry::Dir(child) => self.size_of(*child)?,
            };
            total.checked_add(size).ok_or_else(|| self.overflow(id))
        })
    }

    /// Sizes of all directories, computed in one sweep from the leaves up.
    pub fn dir_sizes(&self) -> Result<DirSizes, TreeError> {
        let mut sizes = vec![0u64; self.dirs.len()];
        for (i, dir) in self.dirs.iter().enumerate().rev() {
            let id = DirId(i);
            sizes[i] = dir
                .files()
                .try_fold(sizes[i], |total, f| total.checked_add(f.size))
                .ok_or_else(|| self.overflow(id))?;
            if let Some(parent) = dir.parent {
                sizes[parent.0] = sizes[parent.0]
                    .checked_add(sizes[i])
                    .ok_or_else(|| self.overflow(parent))?;
            }
        }

        Ok(DirSizes { sizes })
    }
}

/// Parser state: the tree built so far and the current directory.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    fs: Filesystem,
    cwd: DirId,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(&self) -> DirId {
        self.cwd
    }

    pub fn filesystem(&self) -> &Filesystem {
        &self.fs
    }

    pub fn step(mut self, line: Line) -> Result<Self, TreeError> {
        trace!(?line, cwd = %self.fs.path(self.cwd), "step");

        match line {
            Line::CdUp => match self.fs.parent(self.cwd) {
                Some(parent) => self.cwd = parent,
                None => warn!("cd .. at root, staying at /"),
            },
            Line::CdRoot => self.cwd = DirId::ROOT,
            Line::CdInto(name) => {
                self.cwd = match self.fs.find_child(self.cwd, &name) {
                    Some(Entry::Dir(child)) => *child,
                    Some(Entry::File(_)) => {
                        return Err(TreeError::NotADirectory {
                            name,
                            cwd: self.fs.path(self.cwd),
                        })
                    }
                    None => {
                        return Err(TreeError::UnknownDirectory {
                            name,
                            cwd: self.fs.path(self.cwd),
                        })
                    }
                }
            }
            Line::Ls => {}
            Line::DirEntry(name) => {
                if let Some(id) = self.fs.add_dir(self.cwd, &name) {
                    debug!(path = %self.fs.path(id), "new directory");
                }
            }
            Line::FileEntry { name, size } => {
                self.fs.add_file(self.cwd, &name, size);
            }
        }

        Ok(self)
    }

    pub fn finish(self) -> Filesystem {
        self.fs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSizes {
    sizes: Vec<u64>,
}

impl DirSizes {
    pub fn get(&self, id: DirId) -> u64 {
        self.sizes[id.0]
    }

    pub fn root(&self) -> u64 {
        self.sizes[DirId::ROOT.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (DirId, u64)> + '_ {
        self.sizes.iter().enumerate().map(|(i, &s)| (DirId(i), s))
    }

    /// Sum of the sizes of every directory no bigger than `threshold`.
    pub fn bounded_total(&self, threshold: u64) -> Result<u64, TreeError> {
        self.sizes
            .iter()
            .filter(|&&s| s <= threshold)
            .try_fold(0u64, |total, &s| total.checked_add(s))
            .ok_or(TreeError::BoundedTotalOverflow { threshold })
    }

    /// How much more space has to be freed. Negative when there is already
    /// enough free space. The root always qualifies while
    /// `space_needed <= total_size`, so [`TreeError::NoCandidate`] only
    /// comes up when more space is wanted than the disk holds.
    pub fn clear_at_least(&self, config: &DiskConfig) -> i128 {
        i128::from(config.space_needed) - (i128::from(config.total_size) - i128::from(self.root()))
    }

    pub fn smallest_to_delete(&self, config: &DiskConfig) -> Result<(DirId, u64), TreeError> {
        let clear_at_least = self.clear_at_least(config);

        self.iter()
            .filter(|&(_, s)| i128::from(s) >= clear_at_least)
            .min_by_key(|&(_, s)| s)
            .ok_or(TreeError::NoCandidate { clear_at_least })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analysis {
    pub bounded_total: u64,
    pub smallest_to_delete: u64,
}

pub fn analyze(input: &str, config: &DiskConfig) -> Result<Analysis, TreeError> {
    let fs = Filesystem::parse(input)?;
    let sizes = fs.dir_sizes()?;

    let bounded_total = sizes.bounded_total(config.threshold)?;
    let (dir, smallest_to_delete) = sizes.smallest_to_delete(config)?;
    debug!(
        dirs = fs.dir_count(),
        used = sizes.root(),
        bounded_total,
        delete = %fs.path(dir),
        smallest_to_delete,
        "analysis done"
    );

    Ok(Analysis {
        bounded_total,
        smallest_to_delete,
    })
}
