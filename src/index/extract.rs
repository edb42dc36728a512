// src/index/extract.rs - Lua declarations and their doc comments, text in, symbols out

use log::warn;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Module,
    Function,
    LocalFunction,
    Table,
    LocalTable,
    Field,
}

impl SymbolKind {
    /// One-letter code used in tag files.
    pub fn code(self) -> char {
        match self {
            SymbolKind::Module => 'm',
            SymbolKind::Function => 'f',
            SymbolKind::LocalFunction => 'l',
            SymbolKind::Table => 't',
            SymbolKind::LocalTable => 'T',
            SymbolKind::Field => 'F',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'm' => Some(SymbolKind::Module),
            'f' => Some(SymbolKind::Function),
            'l' => Some(SymbolKind::LocalFunction),
            't' => Some(SymbolKind::Table),
            'T' => Some(SymbolKind::LocalTable),
            'F' => Some(SymbolKind::Field),
            _ => None,
        }
    }

    pub fn is_callable(self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::LocalFunction)
    }

    pub fn is_local(self) -> bool {
        matches!(self, SymbolKind::LocalFunction | SymbolKind::LocalTable)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    /// Enclosing module or table; empty for globals and locals.
    pub class: String,
    pub kind: SymbolKind,
    /// The trimmed source line the symbol is declared on.
    pub locator: String,
    /// Zero-based line of the locator when extracted.
    pub line: usize,
    /// Header line (`util.add(a, b)`) followed by description and annotations.
    pub doc: String,
}

impl Symbol {
    pub fn header(&self) -> &str {
        self.doc.lines().next().unwrap_or_default()
    }

    pub fn qualified_name(&self) -> String {
        if self.class.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.class, self.name)
        }
    }
}

/// The module a file defines when nothing in it says otherwise: its stem, or the
/// directory name for `init.lua`.
pub fn module_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if stem == "init" {
        if let Some(dir) = path.parent().and_then(|p| p.file_name()) {
            return dir.to_string_lossy().to_string();
        }
    }
    stem
}

struct Patterns {
    local_function: Regex,
    local_function_value: Regex,
    function: Regex,
    function_value: Regex,
    local_table: Regex,
    table: Regex,
    field: Regex,
    ret: Regex,
    module_tag: Regex,
    self_tag: Regex,
    param_tag: Regex,
    long_bracket: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("valid regex");
        Patterns {
            local_function: re(r"^local\s+function\s+([A-Za-z_]\w*)\s*\(([^)]*)\)"),
            local_function_value: re(r"^local\s+([A-Za-z_]\w*)\s*=\s*function\s*\(([^)]*)\)"),
            function: re(r"^function\s+([\w.:]+)\s*\(([^)]*)\)"),
            function_value: re(r"^([\w.:]+)\s*=\s*function\s*\(([^)]*)\)"),
            local_table: re(r"^local\s+([A-Za-z_]\w*)\s*=\s*\{"),
            table: re(r"^([\w.]+)\s*=\s*\{"),
            field: re(r"^([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)+)\s*=(?:[^=]|$)"),
            ret: re(r"^return\s+([A-Za-z_]\w*)\s*;?\s*$"),
            module_tag: re(r"^-+\s*@module\s+([\w.]+)"),
            self_tag: re(r"^@(module|function|table|field)\s+([\w.:]+)\s*(.*)$"),
            param_tag: re(r"^@param\s+([\w.]+)"),
            long_bracket: re(r"(?:--)?\[(=*)\[|--"),
        }
    })
}

enum Declaration {
    Function { target: String, params: String, local: bool },
    Table { target: String, local: bool },
    Field { target: String },
}

/// Recognize a declaration. Locals only count at the top level of the file.
fn parse_declaration(line: &str) -> Option<Declaration> {
    let p = patterns();
    let top_level = !line.starts_with(char::is_whitespace);
    let trimmed = line.trim();

    if top_level {
        if let Some(c) = p
            .local_function
            .captures(trimmed)
            .or_else(|| p.local_function_value.captures(trimmed))
        {
            return Some(Declaration::Function {
                target: c[1].to_string(),
                params: normalize_params(&c[2]),
                local: true,
            });
        }
    }
    if let Some(c) = p
        .function
        .captures(trimmed)
        .or_else(|| p.function_value.captures(trimmed))
    {
        if on_self(&c[1]) {
            return None;
        }
        return Some(Declaration::Function {
            target: c[1].to_string(),
            params: normalize_params(&c[2]),
            local: false,
        });
    }
    if top_level {
        if let Some(c) = p.local_table.captures(trimmed) {
            return Some(Declaration::Table {
                target: c[1].to_string(),
                local: true,
            });
        }
    }
    if trimmed.starts_with("local ") {
        return None;
    }
    if let Some(c) = p.table.captures(trimmed) {
        if on_self(&c[1]) {
            return None;
        }
        return Some(Declaration::Table {
            target: c[1].to_string(),
            local: false,
        });
    }
    // Assignments nested in a body are runtime state, not declarations.
    if !top_level {
        return None;
    }
    p.field
        .captures(trimmed)
        .filter(|c| !on_self(&c[1]))
        .map(|c| Declaration::Field {
            target: c[1].to_string(),
        })
}

/// `self.x` and `self:x` belong to whatever object a method runs on.
fn on_self(target: &str) -> bool {
    target == "self" || target.starts_with("self.") || target.starts_with("self:")
}

/// The closing bracket of a long string or block comment that `line` opens but does
/// not close, such as `]==]` for `[==[`.
fn unclosed_long_bracket(line: &str) -> Option<String> {
    let p = patterns();
    let mut rest = line;
    loop {
        let open = p.long_bracket.captures(rest)?;
        let level = open.get(1)?;
        let close = format!("]{}]", level.as_str());
        let after = &rest[open.get(0)?.end()..];
        match after.find(&close) {
            Some(end) => rest = &after[end + close.len()..],
            None => return Some(close),
        }
    }
}

fn normalize_params(params: &str) -> String {
    params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct Qualified {
    class: String,
    name: String,
    method: bool,
}

/// Split `a.b.c`, `a:b` or `_G.x` into enclosing class and name. `None` when the name
/// is malformed.
fn split_qualified(raw: &str) -> Option<Qualified> {
    let raw = raw.strip_prefix("_G.").unwrap_or(raw);
    let (path, method_name) = match raw.split_once(':') {
        Some((path, name)) => (path, Some(name)),
        None => (raw, None),
    };
    let mut segments: Vec<&str> = path.split('.').collect();
    if let Some(name) = method_name {
        segments.push(name);
    }
    if !segments.iter().all(|s| is_identifier(s)) {
        return None;
    }
    let name = segments.pop()?.to_string();
    Some(Qualified {
        class: segments.join("."),
        name,
        method: method_name.is_some(),
    })
}

struct Extractor<'a> {
    module: String,
    file_module: &'a str,
    aliases: HashMap<String, String>,
    symbols: Vec<Symbol>,
    /// Qualified name of the last table or module declared, for bare `@field` tags.
    container: Option<String>,
}

impl Extractor<'_> {
    fn qualify(&self, raw: &str) -> Qualified {
        match split_qualified(raw) {
            Some(mut q) => {
                q.class = self.rewrite_alias(&q.class);
                q
            }
            None => {
                let name = raw
                    .rsplit(['.', ':'])
                    .find(|s| !s.is_empty())
                    .unwrap_or(raw)
                    .to_string();
                warn!(
                    "{}: malformed name `{}`, filing it under module {}",
                    self.file_module, raw, self.module
                );
                Qualified {
                    class: self.module.clone(),
                    name,
                    method: false,
                }
            }
        }
    }

    fn rewrite_alias(&self, class: &str) -> String {
        let (head, rest) = match class.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (class, None),
        };
        match (self.aliases.get(head), rest) {
            (Some(module), Some(rest)) => format!("{}.{}", module, rest),
            (Some(module), None) => module.clone(),
            (None, _) => class.to_string(),
        }
    }

    fn push(
        &mut self,
        name: String,
        class: String,
        kind: SymbolKind,
        header: String,
        body: &[String],
        locator: (usize, &str),
    ) {
        if matches!(kind, SymbolKind::Table | SymbolKind::Module) {
            self.container = Some(if class.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", class, name)
            });
        }
        let mut doc = header;
        for line in body {
            doc.push('\n');
            doc.push_str(line);
        }
        self.symbols.push(Symbol {
            name,
            class,
            kind,
            locator: locator.1.trim().to_string(),
            line: locator.0,
            doc: doc.trim_end().to_string(),
        });
    }

    fn declaration(&mut self, decl: Declaration, body: &[String], line: (usize, &str)) {
        match decl {
            Declaration::Function {
                target,
                params,
                local: true,
            } => {
                let header = format!("local {}({})", target, params);
                self.push(target, String::new(), SymbolKind::LocalFunction, header, body, line);
            }
            Declaration::Function { target, params, .. } => {
                let q = self.qualify(&target);
                let header = if q.class.is_empty() {
                    format!("{}({})", q.name, params)
                } else {
                    let sep = if q.method { ':' } else { '.' };
                    format!("{}{}{}({})", q.class, sep, q.name, params)
                };
                self.push(q.name, q.class, SymbolKind::Function, header, body, line);
            }
            Declaration::Table { target, .. } if self.aliases.contains_key(&target) => {
                let module = self.module.clone();
                let declared = self
                    .symbols
                    .iter()
                    .any(|s| s.kind == SymbolKind::Module && s.name == module);
                if !declared {
                    self.push(module.clone(), String::new(), SymbolKind::Module, module, body, line);
                }
            }
            Declaration::Table {
                target,
                local: true,
            } => {
                let header = format!("local {}", target);
                self.push(target, String::new(), SymbolKind::LocalTable, header, body, line);
            }
            Declaration::Table { target, .. } => {
                let q = self.qualify(&target);
                let header = qualified_header(&q.class, &q.name);
                self.push(q.name, q.class, SymbolKind::Table, header, body, line);
            }
            Declaration::Field { target } => {
                let q = self.qualify(&target);
                let header = qualified_header(&q.class, &q.name);
                self.push(q.name, q.class, SymbolKind::Field, header, body, line);
            }
        }
    }

    /// A doc block that names its own symbol (`@module`, `@function`, `@table`, `@field`).
    fn self_documented(&mut self, tag: &str, raw: &str, rest: &str, body: &[String], line: (usize, &str)) {
        let p = patterns();
        match tag {
            "module" => {
                let header = raw.to_string();
                self.push(raw.to_string(), String::new(), SymbolKind::Module, header, body, line);
            }
            "function" => {
                let q = self.qualify(raw);
                let params: Vec<String> = body
                    .iter()
                    .filter_map(|l| p.param_tag.captures(l).map(|c| c[1].to_string()))
                    .collect();
                let header = if q.class.is_empty() {
                    format!("{}({})", q.name, params.join(", "))
                } else {
                    let sep = if q.method { ':' } else { '.' };
                    format!("{}{}{}({})", q.class, sep, q.name, params.join(", "))
                };
                self.push(q.name, q.class, SymbolKind::Function, header, body, line);
            }
            "table" => {
                let q = self.qualify(raw);
                let header = qualified_header(&q.class, &q.name);
                self.push(q.name, q.class, SymbolKind::Table, header, body, line);
            }
            _ => {
                let q = if raw.contains(['.', ':']) {
                    self.qualify(raw)
                } else {
                    Qualified {
                        class: self
                            .container
                            .clone()
                            .unwrap_or_else(|| self.module.clone()),
                        name: raw.to_string(),
                        method: false,
                    }
                };
                let mut body = body.to_vec();
                if !rest.is_empty() {
                    body.insert(0, rest.to_string());
                }
                let header = qualified_header(&q.class, &q.name);
                self.push(q.name, q.class, SymbolKind::Field, header, &body, line);
            }
        }
    }
}

fn qualified_header(class: &str, name: &str) -> String {
    if class.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", class, name)
    }
}

fn is_code(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with("--")
}

/// Extract every declaration in `text`. `file_module` names the module of a file that
/// does not declare one itself.
pub fn extract_symbols(text: &str, file_module: &str) -> Vec<Symbol> {
    let p = patterns();
    let lines: Vec<&str> = text.lines().collect();

    let module = lines
        .iter()
        .find_map(|l| p.module_tag.captures(l.trim()).map(|c| c[1].to_string()))
        .unwrap_or_else(|| file_module.to_string());
    let mut aliases = HashMap::new();
    if let Some(returned) = lines
        .iter()
        .rev()
        .find(|l| is_code(l))
        .and_then(|l| p.ret.captures(l.trim()))
    {
        aliases.insert(returned[1].to_string(), module.clone());
    }

    let mut extractor = Extractor {
        module,
        file_module,
        aliases,
        symbols: Vec::new(),
        container: None,
    };
    let mut pending: Vec<String> = Vec::new();
    let mut last_code: Option<usize> = None;
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();

        if let Some(close) = unclosed_long_bracket(lines[i]) {
            if !trimmed.starts_with("--") {
                if let Some(decl) = parse_declaration(lines[i]) {
                    let body = std::mem::take(&mut pending);
                    extractor.declaration(decl, &body, (i, lines[i]));
                }
                last_code = Some(i);
            }
            pending.clear();
            i += 1;
            while i < lines.len() && !lines[i].contains(&close) {
                i += 1;
            }
            i += 1;
            continue;
        }

        if trimmed.starts_with("---") {
            let start = i;
            let mut block = Vec::new();
            while i < lines.len() && lines[i].trim().starts_with("--") {
                let text = lines[i].trim().trim_start_matches('-');
                block.push(text.strip_prefix(' ').unwrap_or(text).trim_end().to_string());
                i += 1;
            }
            let tag = block.iter().enumerate().find_map(|(n, l)| {
                p.self_tag.captures(l).map(|c| {
                    (n, c[1].to_string(), c[2].to_string(), c[3].trim().to_string())
                })
            });
            match tag {
                Some((pos, tag, raw, rest)) => {
                    let body: Vec<String> = block
                        .iter()
                        .enumerate()
                        .filter(|(n, _)| *n != pos)
                        .map(|(_, l)| l.clone())
                        .collect();
                    let locator = last_code
                        .or_else(|| (i..lines.len()).find(|&n| is_code(lines[n])))
                        .unwrap_or(start);
                    extractor.self_documented(&tag, &raw, &rest, &body, (locator, lines[locator]));
                    pending.clear();
                }
                None => pending = block,
            }
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with("--") {
            i += 1;
            continue;
        }

        if let Some(decl) = parse_declaration(lines[i]) {
            let body = std::mem::take(&mut pending);
            extractor.declaration(decl, &body, (i, lines[i]));
        }
        pending.clear();
        last_code = Some(i);
        i += 1;
    }

    extractor.symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(symbols: &'a [Symbol], name: &str) -> &'a Symbol {
        symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no symbol {}", name))
    }

    #[test]
    fn test_qualified_function() {
        let symbols = extract_symbols("function util.add(a, b) end\n", "util");
        assert_eq!(symbols.len(), 1);
        let add = &symbols[0];
        assert_eq!(add.name, "add");
        assert_eq!(add.class, "util");
        assert_eq!(add.kind, SymbolKind::Function);
        assert_eq!(add.header(), "util.add(a, b)");
        assert_eq!(add.locator, "function util.add(a, b) end");
    }

    #[test]
    fn test_doc_comment_attaches_to_next_declaration() {
        let text = "--- Adds two numbers.\n-- @param a first\n-- @param b second\n\nfunction util.add(a,b)\n  return a + b\nend\n";
        let add = &extract_symbols(text, "util")[0];
        assert_eq!(add.line, 4);
        assert_eq!(
            add.doc,
            "util.add(a, b)\nAdds two numbers.\n@param a first\n@param b second"
        );
    }

    #[test]
    fn test_returned_local_is_the_module() {
        let text = "local M = {}\n\nfunction M.greet(name) end\nM.version = 2\nlocal function helper(x) end\nreturn M\n";
        let symbols = extract_symbols(text, "greeter");
        let module = &symbols[0];
        assert_eq!((module.name.as_str(), module.kind), ("greeter", SymbolKind::Module));
        let greet = find(&symbols, "greet");
        assert_eq!(greet.class, "greeter");
        assert_eq!(greet.header(), "greeter.greet(name)");
        let version = find(&symbols, "version");
        assert_eq!((version.class.as_str(), version.kind), ("greeter", SymbolKind::Field));
        let helper = find(&symbols, "helper");
        assert_eq!(helper.kind, SymbolKind::LocalFunction);
        assert_eq!(helper.class, "");
        assert_eq!(helper.header(), "local helper(x)");
    }

    #[test]
    fn test_method_and_global_root() {
        let text = "function Stack:push(v) end\nfunction _G.shout(s) end\ncache = {}\n";
        let symbols = extract_symbols(text, "stack");
        let push = find(&symbols, "push");
        assert_eq!(push.class, "Stack");
        assert_eq!(push.header(), "Stack:push(v)");
        let shout = find(&symbols, "shout");
        assert_eq!(shout.class, "");
        assert_eq!(shout.header(), "shout(s)");
        assert_eq!(find(&symbols, "cache").kind, SymbolKind::Table);
    }

    #[test]
    fn test_indented_locals_are_not_indexed() {
        let text = "function run()\n  local tmp = {}\n  local function inner() end\nend\nlocal t = {}\n";
        let symbols = extract_symbols(text, "m");
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["run", "t"]);
        assert_eq!(symbols[1].kind, SymbolKind::LocalTable);
    }

    #[test]
    fn test_self_documented_field_uses_preceding_line() {
        let text = "config = {\n  depth = 3,\n}\n--- @field depth how deep to go\n";
        let symbols = extract_symbols(text, "config");
        let depth = find(&symbols, "depth");
        assert_eq!(depth.kind, SymbolKind::Field);
        assert_eq!(depth.class, "config");
        assert_eq!(depth.locator, "}");
        assert_eq!(depth.doc, "config.depth\nhow deep to go");
    }

    #[test]
    fn test_self_documented_function_takes_params_from_tags() {
        let text = "--- @function fs.walk\n-- Visit every file.\n-- @param dir start here\n-- @param fn callback\n";
        let walk = &extract_symbols(text, "fs")[0];
        assert_eq!(walk.header(), "fs.walk(dir, fn)");
        assert_eq!(walk.line, 0);
    }

    #[test]
    fn test_module_tag_renames_module() {
        let text = "--- @module lib.text\nlocal M = {}\nfunction M.trim(s) end\nreturn M\n";
        let symbols = extract_symbols(text, "init");
        assert_eq!(symbols[0].kind, SymbolKind::Module);
        assert_eq!(symbols[0].name, "lib.text");
        assert_eq!(find(&symbols, "trim").class, "lib.text");
    }

    #[test]
    fn test_malformed_name_falls_back_to_module() {
        let symbols = extract_symbols("function a..b(x) end\n", "broken");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "b");
        assert_eq!(symbols[0].class, "broken");
    }

    #[test]
    fn test_block_comments_are_skipped() {
        let text = "--[[\nfunction hidden() end\n]]\nfunction shown() end\n";
        let symbols = extract_symbols(text, "m");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "shown");
    }

    #[test]
    fn test_long_strings_are_skipped() {
        let text = "M.usage = [[\nfunction fake() end\nx.y = 1\n]]\nlocal help = [==[\n]]\nfunction also_fake() end\n]==]\nfunction real() end\n";
        let symbols = extract_symbols(text, "m");
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["usage", "real"]);
        assert_eq!(symbols[1].line, 8);
    }

    #[test]
    fn test_closed_brackets_and_line_comments_do_not_open_strings() {
        let text = "M.a = [[one line]]\nM.b = 1 -- see [[\nfunction M.c() end\n";
        let names: Vec<_> = extract_symbols(text, "m")
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_assignments_in_bodies_are_not_fields() {
        let text = "function Stack.new()\n  self.items = {}\n  self.size = 0\n  Stack.count = 1\nend\nself.top = 1\nStack.limit = 10\n";
        let symbols = extract_symbols(text, "stack");
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["new", "limit"]);
        assert!(symbols.iter().all(|s| s.class != "self"));
    }

    #[test]
    fn test_kind_codes_round_trip() {
        for kind in [
            SymbolKind::Module,
            SymbolKind::Function,
            SymbolKind::LocalFunction,
            SymbolKind::Table,
            SymbolKind::LocalTable,
            SymbolKind::Field,
        ] {
            assert_eq!(SymbolKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_module_name_for_init() {
        assert_eq!(module_name_for(Path::new("/p/lib/init.lua")), "lib");
        assert_eq!(module_name_for(Path::new("/p/util.lua")), "util");
    }
}
