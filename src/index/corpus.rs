// src/index/corpus.rs - Tag and API-doc corpus files

use super::IndexError;
use super::extract::{Symbol, SymbolKind};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Stands in for the scanned root in stored paths.
pub const ROOT_PLACEHOLDER: &str = "$ROOT";
/// Stands in for the directory holding the built-in declarations.
pub const STDLIB_PLACEHOLDER: &str = "$STDLIB";

/// One declaration: `name\tfile\t/^locator$/;"\tkind[\tclass:Class]`. Tabs, newlines and
/// backslashes in the file field are backslash-escaped.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEntry {
    pub name: String,
    /// Path with the root replaced by a placeholder.
    pub file: String,
    pub locator: String,
    pub kind: SymbolKind,
    pub class: String,
}

impl TagEntry {
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{}\t{}\t/^{}$/;\"\t{}",
            self.name,
            escape_file(&self.file),
            escape_locator(&self.locator),
            self.kind.code()
        );
        if !self.class.is_empty() {
            line.push_str("\tclass:");
            line.push_str(&self.class);
        }
        line
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let (name, rest) = line.split_once('\t')?;
        let (file, rest) = rest.split_once('\t')?;
        let rest = rest.strip_prefix("/^")?;
        let end = rest.rfind("$/;\"")?;
        let locator = unescape(&rest[..end]);
        let mut fields = rest[end + 4..].trim_start_matches('\t').split('\t');
        let kind = fields.next()?.chars().next().and_then(SymbolKind::from_code)?;
        let class = fields
            .find_map(|f| f.strip_prefix("class:"))
            .unwrap_or_default()
            .to_string();
        Some(Self {
            name: name.to_string(),
            file: unescape(file),
            locator,
            kind,
            class,
        })
    }

    /// The file on disk: placeholders are swapped for real directories.
    pub fn resolve_path(&self, root: &Path, stdlib: &Path) -> PathBuf {
        resolve_label(&self.file, root, stdlib)
    }
}

/// One documentation block: `name <escaped block>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiEntry {
    pub name: String,
    pub doc: String,
}

impl ApiEntry {
    pub fn to_line(&self) -> String {
        format!("{} {}", self.name, escape_doc(&self.doc))
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let (name, doc) = line.split_once(' ')?;
        Some(Self {
            name: name.to_string(),
            doc: unescape_doc(doc),
        })
    }

    pub fn header(&self) -> &str {
        self.doc.lines().next().unwrap_or_default()
    }

    /// The header's name part with `local ` and the parameter list removed.
    pub fn qualified_name(&self) -> &str {
        let header = self.header();
        let header = header.strip_prefix("local ").unwrap_or(header);
        header.split('(').next().unwrap_or(header).trim()
    }

    pub fn is_local(&self) -> bool {
        self.header().starts_with("local ")
    }
}

/// Tag and API entries, paired by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub tags: Vec<TagEntry>,
    pub api: Vec<ApiEntry>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_symbols(file: &str, symbols: &[Symbol]) -> Self {
        let mut corpus = Self::new();
        corpus.extend(file, symbols);
        corpus
    }

    pub fn extend(&mut self, file: &str, symbols: &[Symbol]) {
        for symbol in symbols {
            self.tags.push(TagEntry {
                name: symbol.name.clone(),
                file: file.to_string(),
                locator: symbol.locator.clone(),
                kind: symbol.kind,
                class: symbol.class.clone(),
            });
            self.api.push(ApiEntry {
                name: symbol.name.clone(),
                doc: symbol.doc.clone(),
            });
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&TagEntry, &ApiEntry)> {
        self.tags.iter().zip(self.api.iter())
    }

    /// Write `<stem>.tags` and `<stem>.api` into `dir`.
    pub fn write(&self, dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf), IndexError> {
        let tags_path = dir.join(format!("{}.tags", stem));
        let api_path = dir.join(format!("{}.api", stem));
        self.write_files(&tags_path, &api_path)?;
        Ok((tags_path, api_path))
    }

    pub fn write_files(&self, tags_path: &Path, api_path: &Path) -> Result<(), IndexError> {
        write_lines(tags_path, self.tags.iter().map(TagEntry::to_line))?;
        write_lines(api_path, self.api.iter().map(ApiEntry::to_line))
    }

    /// Read a pair written by [`Corpus::write`]. Line `n` of one file belongs to line
    /// `n` of the other; a pair where either side fails to parse is logged and skipped.
    pub fn load(tags_path: &Path, api_path: &Path) -> Result<Self, IndexError> {
        let tag_lines = read_lines(tags_path)?;
        let api_lines = read_lines(api_path)?;
        if tag_lines.len() != api_lines.len() {
            return Err(IndexError::Corpus(format!(
                "{} has {} lines but {} has {}",
                tags_path.display(),
                tag_lines.len(),
                api_path.display(),
                api_lines.len()
            )));
        }
        let mut corpus = Self::new();
        for (n, (tag, api)) in tag_lines.iter().zip(&api_lines).enumerate() {
            match (TagEntry::parse_line(tag), ApiEntry::parse_line(api)) {
                (Some(tag), Some(api)) => {
                    corpus.tags.push(tag);
                    corpus.api.push(api);
                }
                _ => warn!(
                    "{}:{}: unreadable entry skipped",
                    tags_path.display(),
                    n + 1
                ),
            }
        }
        Ok(corpus)
    }
}

/// `$ROOT/src/a.lua` for a path under `root`; other paths are kept absolute.
pub fn file_label(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => format!(
            "{}/{}",
            ROOT_PLACEHOLDER,
            relative.to_string_lossy().replace('\\', "/")
        ),
        Err(_) => path.to_string_lossy().to_string(),
    }
}

pub fn resolve_label(label: &str, root: &Path, stdlib: &Path) -> PathBuf {
    if let Some(rest) = label.strip_prefix(ROOT_PLACEHOLDER) {
        root.join(rest.trim_start_matches('/'))
    } else if let Some(rest) = label.strip_prefix(STDLIB_PLACEHOLDER) {
        stdlib.join(rest.trim_start_matches('/'))
    } else {
        PathBuf::from(label)
    }
}

fn escape_locator(locator: &str) -> String {
    locator
        .replace('\\', "\\\\")
        .replace('/', "\\/")
        .replace('\t', "\\t")
}

fn escape_file(file: &str) -> String {
    file.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
}

/// Undo [`escape_locator`] or [`escape_file`].
fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        match (c, chars.clone().next()) {
            ('\\', Some('t')) => {
                out.push('\t');
                chars.next();
            }
            ('\\', Some('n')) => {
                out.push('\n');
                chars.next();
            }
            ('\\', Some(next @ ('\\' | '/'))) => {
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Backslash becomes `\\`, newline becomes `\n`.
pub fn escape_doc(doc: &str) -> String {
    doc.replace('\\', "\\\\").replace('\n', "\\n")
}

pub fn unescape_doc(doc: &str) -> String {
    let mut out = String::with_capacity(doc.len());
    let mut chars = doc.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn write_lines(path: &Path, lines: impl Iterator<Item = String>) -> Result<(), IndexError> {
    let mut content = String::new();
    for line in lines {
        content.push_str(&line);
        content.push('\n');
    }
    fs::write(path, content).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_lines(path: &Path) -> Result<Vec<String>, IndexError> {
    let content = fs::read_to_string(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.lines().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tag(locator: &str, class: &str) -> TagEntry {
        TagEntry {
            name: "add".to_string(),
            file: "$ROOT/util.lua".to_string(),
            locator: locator.to_string(),
            kind: SymbolKind::Function,
            class: class.to_string(),
        }
    }

    #[test]
    fn test_tag_line_format() {
        let entry = tag("function util.add(a, b) end", "util");
        assert_eq!(
            entry.to_line(),
            "add\t$ROOT/util.lua\t/^function util.add(a, b) end$/;\"\tf\tclass:util"
        );
        assert_eq!(TagEntry::parse_line(&entry.to_line()), Some(entry));
    }

    #[test]
    fn test_tag_without_class_has_no_class_field() {
        let entry = tag("local function add(a, b)", "");
        assert!(entry.to_line().ends_with("\tf"));
        assert_eq!(TagEntry::parse_line(&entry.to_line()).unwrap().class, "");
    }

    #[test]
    fn test_awkward_locators_survive() {
        let entry = tag(r#"x = a / b -- path\to "$/;" end"#, "");
        assert_eq!(TagEntry::parse_line(&entry.to_line()).unwrap().locator, entry.locator);
    }

    #[test]
    fn test_api_line_escaping() {
        let entry = ApiEntry {
            name: "add".to_string(),
            doc: "util.add(a, b)\nJoins a\\b".to_string(),
        };
        assert_eq!(entry.to_line(), "add util.add(a, b)\\nJoins a\\\\b");
        assert_eq!(ApiEntry::parse_line(&entry.to_line()), Some(entry));
    }

    #[test]
    fn test_api_qualified_name() {
        let local = ApiEntry {
            name: "helper".to_string(),
            doc: "local helper(x)\nText".to_string(),
        };
        assert!(local.is_local());
        assert_eq!(local.qualified_name(), "helper");
    }

    #[test]
    fn test_labels() {
        let root = Path::new("/work/proj");
        let label = file_label(Path::new("/work/proj/src/a.lua"), root);
        assert_eq!(label, "$ROOT/src/a.lua");
        assert_eq!(
            resolve_label(&label, Path::new("/mnt/copy"), Path::new("/std")),
            PathBuf::from("/mnt/copy/src/a.lua")
        );
        assert_eq!(
            resolve_label("$STDLIB/stdlib.lua", root, Path::new("/std")),
            PathBuf::from("/std/stdlib.lua")
        );
    }

    #[test]
    fn test_write_and_load() {
        let dir = TempDir::new().unwrap();
        let mut corpus = Corpus::new();
        corpus.tags.push(tag("function util.add(a, b) end", "util"));
        corpus.api.push(ApiEntry {
            name: "add".to_string(),
            doc: "util.add(a, b)".to_string(),
        });
        let (tags, api) = corpus.write(dir.path(), "tags").unwrap();
        assert_eq!(Corpus::load(&tags, &api).unwrap(), corpus);
    }

    #[test]
    fn test_awkward_file_names_survive() {
        let mut entry = tag("function util.add(a, b) end", "util");
        entry.file = "$ROOT/odd\tname\\x\n.lua".to_string();
        let line = entry.to_line();
        assert_eq!(line.lines().count(), 1);
        assert_eq!(line.split('\t').nth(1), Some("$ROOT/odd\\tname\\\\x\\n.lua"));
        assert_eq!(TagEntry::parse_line(&line), Some(entry));
    }

    #[test]
    fn test_load_skips_unreadable_pair() {
        let dir = TempDir::new().unwrap();
        let tags = dir.path().join("x.tags");
        let api = dir.path().join("x.api");
        let good = tag("function util.add(a, b) end", "util");
        fs::write(&tags, format!("garbage\n{}\n", good.to_line())).unwrap();
        fs::write(&api, "junk text\nadd util.add(a, b)\n").unwrap();
        let corpus = Corpus::load(&tags, &api).unwrap();
        assert_eq!(corpus.tags, vec![good]);
        assert_eq!(corpus.api[0].doc, "util.add(a, b)");
    }

    #[test]
    fn test_load_rejects_unpaired_files() {
        let dir = TempDir::new().unwrap();
        let tags = dir.path().join("x.tags");
        let api = dir.path().join("x.api");
        fs::write(&tags, tag("a", "").to_line()).unwrap();
        fs::write(&api, "").unwrap();
        assert!(matches!(Corpus::load(&tags, &api), Err(IndexError::Corpus(_))));
    }
}
