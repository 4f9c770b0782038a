//! Quote-aware helpers over pipe-query text.
//!
//! The planner never parses the full command grammar. It only needs to find
//! pipe stages, leading verbs, `write` targets, the files a query reads and
//! the `[placeholder]` tokens it references. Everything here respects quoted
//! literals (`'...'`, `"..."` with backslash escapes) and nesting of
//! `(...)`, `<(...)` and `[...]`.

/// Verbs whose query is a dictionary listing (`verb file tag file tag ...`).
pub const DICTIONARY_VERBS: &[&str] = &["gordict", "gordictpart", "nordict"];

/// Verbs whose query gathers partitions into a dictionary folder
/// (`verb folder file tag file tag ...`).
pub const DICTIONARY_FOLDER_VERBS: &[&str] = &["gordictfolder", "gordictfolderpart"];

/// Source verbs that synthesize rows instead of reading files.
const GENERATOR_VERBS: &[&str] = &[
    "gorrow", "gorrows", "norrow", "norrows", "cmd", "gorcmd", "norcmd",
];

/// Pipe stages whose first positional argument is a file.
const FILE_STAGE_VERBS: &[&str] = &["join", "varjoin", "map", "multimap", "inset", "merge"];

/// Source options that consume the following word.
const SOURCE_VALUED_OPTIONS: &[&str] = &[
    "-p", "-f", "-ff", "-s", "-split", "-b", "-seek", "-parts", "-dict",
];

/// Options of file-reading stages that consume the following word.
const STAGE_VALUED_OPTIONS: &[&str] = &["-c", "-f", "-m", "-e", "-n", "-xl", "-xr", "-xcol", "-z"];

/// `write` options that consume the following word.
pub const WRITE_VALUED_OPTIONS: &[&str] = &[
    "-f", "-t", "-card", "-prefix", "-m", "-i", "-l", "-link", "-tags",
];

/// Marker that turns a write target into a per-fork path template.
pub const FORK_TEMPLATE_MARKER: &str = "#{";

#[derive(Default)]
struct Scan {
    single: bool,
    double: bool,
    escaped: bool,
    depth: usize,
}

impl Scan {
    /// Feed one char; returns true when the char is outside quotes and nesting.
    fn step(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        if self.single {
            if c == '\'' {
                self.single = false;
            }
            return false;
        }
        if self.double {
            match c {
                '\\' => self.escaped = true,
                '"' => self.double = false,
                _ => {}
            }
            return false;
        }
        match c {
            '\'' => {
                self.single = true;
                false
            }
            '"' => {
                self.double = true;
                false
            }
            '(' | '[' => {
                self.depth += 1;
                false
            }
            ')' | ']' => {
                self.depth = self.depth.saturating_sub(1);
                false
            }
            _ => self.depth == 0,
        }
    }

    fn in_quotes(&self) -> bool {
        self.single || self.double
    }
}

/// Split on `sep` outside of quotes and nesting.
///
/// With `' '` as separator empty pieces are dropped; with any other separator
/// pieces are returned untrimmed.
pub fn quote_safe_split(text: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut scan = Scan::default();
    for c in text.chars() {
        let free = scan.step(c);
        if free && c == sep {
            out.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    out.push(cur);
    if sep == ' ' {
        out.retain(|s| !s.is_empty());
    } else if out.len() == 1 && out[0].is_empty() {
        out.clear();
    }
    out
}

/// `quote_safe_split` with every piece trimmed and blanks dropped.
pub fn quote_safe_split_trim(text: &str, sep: char) -> Vec<String> {
    quote_safe_split(text, sep)
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Pipe stages of a query, trimmed.
pub fn stages(query: &str) -> Vec<String> {
    quote_safe_split_trim(query, '|')
}

/// Words of a single stage.
pub fn words(stage: &str) -> Vec<String> {
    quote_safe_split(stage.trim(), ' ')
}

/// Lower-cased leading verb of a stage.
pub fn verb(stage: &str) -> String {
    words(stage)
        .into_iter()
        .next()
        .map(|w| w.to_ascii_lowercase())
        .unwrap_or_default()
}

/// First pipe stage of a query.
pub fn first_stage(query: &str) -> String {
    stages(query).into_iter().next().unwrap_or_default()
}

/// Last pipe stage of a query.
pub fn last_stage(query: &str) -> String {
    stages(query).pop().unwrap_or_default()
}

/// Lower-cased leading verb of the query's first stage.
pub fn first_verb(query: &str) -> String {
    verb(&first_stage(query))
}

pub fn is_dictionary_query(query: &str) -> bool {
    DICTIONARY_VERBS.contains(&first_verb(query).as_str())
}

pub fn is_dictionary_folder_query(query: &str) -> bool {
    DICTIONARY_FOLDER_VERBS.contains(&first_verb(query).as_str())
}

/// Queries over non-genomic (row-number ordered) tables.
pub fn is_nor_query(query: &str) -> bool {
    first_verb(query).starts_with("nor")
}

pub fn is_write_stage(stage: &str) -> bool {
    verb(stage) == "write"
}

/// Option/positional view of a stage's arguments (verb excluded).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageArgs {
    pub options: Vec<(String, Option<String>)>,
    pub positional: Vec<String>,
}

impl StageArgs {
    pub fn parse(stage: &str, valued: &[&str]) -> Self {
        let mut args = StageArgs::default();
        let mut it = words(stage).into_iter().skip(1);
        while let Some(w) = it.next() {
            if w.starts_with('-') && w.len() > 1 {
                let lower = w.to_ascii_lowercase();
                let value = if valued.contains(&lower.as_str()) {
                    it.next()
                } else {
                    None
                };
                args.options.push((lower, value));
            } else {
                args.positional.push(w);
            }
        }
        args
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.options.iter().any(|(o, _)| o == name)
    }

    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(o, _)| o == name)
            .and_then(|(_, v)| v.as_deref())
    }
}

/// A `write` stage writing per-fork output (`-f <columns>`).
pub fn is_fork_write_stage(stage: &str) -> bool {
    is_write_stage(stage) && StageArgs::parse(stage, WRITE_VALUED_OPTIONS).has_option("-f")
}

/// What the trailing `write` stage of a query targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// `write -f ...`: output location decided per fork at run time.
    Fork,
    /// Target contains a fork template marker; `folder` is its parent.
    Template { folder: String },
    /// Literal output path.
    Path(String),
    /// `write` with no target.
    Missing,
}

/// Inspect the query's last stage for an explicit `write`.
pub fn write_target(query: &str) -> Option<WriteTarget> {
    let last = last_stage(query);
    if !is_write_stage(&last) {
        return None;
    }
    if is_fork_write_stage(&last) {
        return Some(WriteTarget::Fork);
    }
    let args = StageArgs::parse(&last, WRITE_VALUED_OPTIONS);
    let target = match args.positional.first() {
        Some(t) => t.trim().to_string(),
        None => return Some(WriteTarget::Missing),
    };
    Some(match fork_template_parent(&target) {
        Some(folder) => WriteTarget::Template { folder },
        None => WriteTarget::Path(target),
    })
}

/// Split a trailing `write [name]` off `query`.
///
/// Returns the query without that stage and the canonical placeholder it
/// writes to. Queries whose last stage writes anything else come back
/// unchanged with `None`.
pub fn split_placeholder_write(query: &str) -> (String, Option<String>) {
    let mut all = stages(query);
    if all.len() < 2 {
        return (query.to_string(), None);
    }
    let Some(last) = all.last() else {
        return (query.to_string(), None);
    };
    if !is_write_stage(last) || is_fork_write_stage(last) {
        return (query.to_string(), None);
    }
    let args = StageArgs::parse(last, WRITE_VALUED_OPTIONS);
    let target = match args.positional.as_slice() {
        [t] if t.starts_with('[') && t.ends_with(']') => canonical_placeholder(t),
        _ => None,
    };
    match target {
        Some(name) if args.options.is_empty() => {
            all.pop();
            (all.join(" | "), Some(name))
        }
        _ => (query.to_string(), None),
    }
}

/// Parent directory of a fork template path, `.` when it has none.
pub fn fork_template_parent(path: &str) -> Option<String> {
    let i = path.find(FORK_TEMPLATE_MARKER)?;
    Some(match path[..i].rfind('/') {
        Some(k) => path[..k].to_string(),
        None => ".".to_string(),
    })
}

/// Any top-level stage is a `write`.
pub fn contains_write(query: &str) -> bool {
    stages(query).iter().any(|s| is_write_stage(s))
}

/// `signature -timeres <seconds>` stage value, if present.
pub fn signature_timeres(query: &str) -> Option<u64> {
    stages(query)
        .iter()
        .filter(|s| verb(s) == "signature")
        .find_map(|s| {
            StageArgs::parse(s, &["-timeres"])
                .option_value("-timeres")
                .and_then(|v| v.parse::<u64>().ok())
        })
}

/// Files (and placeholder tokens) read by a query, sorted and deduplicated.
pub fn used_files(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    if is_dictionary_query(query) {
        let w = words(&first_stage(query));
        let mut i = 1;
        while i + 1 < w.len() {
            out.push(w[i].clone());
            i += 2;
        }
    } else if is_dictionary_folder_query(query) {
        let w = words(&first_stage(query));
        if let Some(folder) = w.get(1) {
            out.push(folder.clone());
        }
        let mut i = 2;
        while i + 1 < w.len() {
            out.push(w[i].clone());
            i += 2;
        }
    } else {
        collect_used_files(query, &mut out);
    }
    out.sort();
    out.dedup();
    out
}

fn nested_query(word: &str) -> Option<&str> {
    word.strip_prefix("<(")
        .or_else(|| word.strip_prefix('('))
        .and_then(|w| w.strip_suffix(')'))
}

fn collect_used_files(query: &str, out: &mut Vec<String>) {
    for (idx, stage) in stages(query).iter().enumerate() {
        let v = verb(stage);
        for w in words(stage).iter().skip(1) {
            if let Some(inner) = nested_query(w) {
                collect_used_files(inner, out);
            }
        }
        if idx == 0 {
            if GENERATOR_VERBS.contains(&v.as_str()) {
                continue;
            }
            let args = StageArgs::parse(stage, SOURCE_VALUED_OPTIONS);
            out.extend(
                args.positional
                    .into_iter()
                    .filter(|w| nested_query(w).is_none()),
            );
        } else if FILE_STAGE_VERBS.contains(&v.as_str()) {
            let args = StageArgs::parse(stage, STAGE_VALUED_OPTIONS);
            if let Some(f) = args
                .positional
                .into_iter()
                .find(|w| nested_query(w).is_none())
            {
                out.push(f);
            }
        }
    }
}

/// Raw `[...]` tokens outside quotes, in order of appearance. Blank tokens
/// (`[]`, `[ ]`) are skipped.
pub fn placeholder_tokens(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    scan_placeholders(query, |tok| {
        out.push(tok.to_string());
        None
    });
    out
}

/// Rewrite every `[...]` token outside quotes with `f(token)`; tokens for
/// which `f` returns `None` are kept verbatim.
pub fn replace_placeholders<F>(query: &str, f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    scan_placeholders(query, f)
}

fn scan_placeholders<F>(query: &str, mut f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(query.len());
    let mut scan = Scan::default();
    let mut chars = query.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '[' && !scan.in_quotes() && !scan.escaped {
            if let Some(end) = query[i..].find(']') {
                let token = &query[i..=i + end];
                if !token[1..token.len() - 1].trim().is_empty() && !token[1..].contains('[') {
                    match f(token) {
                        Some(rep) => out.push_str(&rep),
                        None => out.push_str(token),
                    }
                    while let Some(&(j, _)) = chars.peek() {
                        if j > i + end {
                            break;
                        }
                        chars.next();
                    }
                    continue;
                }
            }
        }
        scan.step(c);
        out.push(c);
    }
    out
}

/// `[ name ]` → `[name]`; `None` for blank names.
pub fn canonical_placeholder(token: &str) -> Option<String> {
    let t = token.trim();
    let inner = t
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(t)
        .trim();
    if inner.is_empty() {
        None
    } else {
        Some(format!("[{inner}]"))
    }
}

/// `.gord` dictionary path, with or without a trailing slash.
pub fn is_gord(path: &str) -> bool {
    path.trim_end_matches('/').ends_with(".gord")
}

/// Template files whose expansion the planner does not model.
pub fn is_template_file(path: &str) -> bool {
    let p = path.to_ascii_lowercase();
    p.ends_with(".yml") || p.ends_with(".yaml")
}

pub fn mark_as_folder(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

pub fn strip_trailing_slash(path: &str) -> &str {
    path.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_safe_split_spaces() {
        assert!(quote_safe_split("", ' ').is_empty());
        assert_eq!(quote_safe_split("bingo bongo", ' '), vec!["bingo", "bongo"]);
        assert_eq!(quote_safe_split("'bingo bongo'", ' '), vec!["'bingo bongo'"]);
        assert_eq!(
            quote_safe_split("'bingo \"'\"bongo'", ' '),
            vec!["'bingo \"'\"bongo'"]
        );
        assert_eq!(
            quote_safe_split("replace(replace(disease,\"'\",\"\"),' ','_')", ' '),
            vec!["replace(replace(disease,\"'\",\"\"),' ','_')"]
        );
        assert_eq!(
            quote_safe_split("\"abcd\\\"1234\" bongo", ' '),
            vec!["\"abcd\\\"1234\"", "bongo"]
        );
    }

    #[test]
    fn test_stages_ignore_quoted_and_nested_pipes() {
        let q = "gor a.gor | where x = '|' | join <(gor b.gor | top 1) | top 5";
        let s = stages(q);
        assert_eq!(s.len(), 4);
        assert_eq!(s[1], "where x = '|'");
        assert_eq!(s[2], "join <(gor b.gor | top 1)");
        assert_eq!(first_verb(q), "gor");
        assert_eq!(last_stage(q), "top 5");
    }

    #[test]
    fn test_write_targets() {
        assert_eq!(write_target("gor a.gor | top 1"), None);
        assert_eq!(
            write_target("gor a.gor | write out.gorz"),
            Some(WriteTarget::Path("out.gorz".into()))
        );
        assert_eq!(
            write_target("gor a.gor | write -card c -f c res/#{fork}_x.gorz"),
            Some(WriteTarget::Fork)
        );
        assert_eq!(
            write_target("pgor a.gor | write -card c mu.gord/#{CHROM}_#{BPSTART}.gorz"),
            Some(WriteTarget::Template {
                folder: "mu.gord".into()
            })
        );
        assert_eq!(
            write_target("gor a.gor | write data_#{fork}.gorz -r"),
            Some(WriteTarget::Template { folder: ".".into() })
        );
        assert_eq!(write_target("gor a.gor | write"), Some(WriteTarget::Missing));
    }

    #[test]
    fn test_placeholder_write_is_split_off() {
        assert_eq!(
            split_placeholder_write("pgor a.gor -split 2 | write [ x ]"),
            ("pgor a.gor -split 2".to_string(), Some("[x]".to_string()))
        );
        assert_eq!(
            split_placeholder_write("gor a.gor | top 1 |write [x]"),
            ("gor a.gor | top 1".to_string(), Some("[x]".to_string()))
        );
        for q in [
            "gor a.gor | write out.gorz",
            "gor a.gor | write -f c [x]",
            "gor a.gor | calc c '[x]'",
            "write [x]",
        ] {
            assert_eq!(split_placeholder_write(q), (q.to_string(), None));
        }
    }

    #[test]
    fn test_used_files_of_plain_and_nested_queries() {
        let q = "gor -p chr1 b.gor a.gor | join -snpsnp <(gor [x] | top 1) \
                 | map -c gene genes.tsv | write out.gorz";
        assert_eq!(used_files(q), vec!["[x]", "a.gor", "b.gor", "genes.tsv"]);
        assert!(used_files("gorrows -p chr1:1-10").is_empty());
    }

    #[test]
    fn test_used_files_of_dictionary_queries() {
        let q = "gordict p1.gorz chr1 p2.gorz chr2";
        assert!(is_dictionary_query(q));
        assert_eq!(used_files(q), vec!["p1.gorz", "p2.gorz"]);

        let q = "gordictfolder out.gord [a] t1 [b] t2";
        assert!(is_dictionary_folder_query(q));
        assert_eq!(used_files(q), vec!["[a]", "[b]", "out.gord"]);
    }

    #[test]
    fn test_placeholder_tokens_respect_quotes() {
        let q = "gor [foo] | join [  bar] | calc s '[not]' | join <(gor [xxx])";
        assert_eq!(placeholder_tokens(q), vec!["[foo]", "[  bar]", "[xxx]"]);
        assert!(placeholder_tokens("gor a.gor | calc x \"[q]\"").is_empty());
    }

    #[test]
    fn test_replace_placeholders_keeps_surroundings() {
        let q = "gor [xxx]/data_0.gorz | calc s '[xxx]'";
        let out = replace_placeholders(q, |t| (t == "[xxx]").then(|| "res".to_string()));
        assert_eq!(out, "gor res/data_0.gorz | calc s '[xxx]'");
    }

    #[test]
    fn test_canonical_placeholder() {
        assert_eq!(canonical_placeholder("xxx").as_deref(), Some("[xxx]"));
        assert_eq!(canonical_placeholder("[   vvv  ]").as_deref(), Some("[vvv]"));
        assert_eq!(canonical_placeholder("[ ]"), None);
        assert_eq!(canonical_placeholder(""), None);
    }

    #[test]
    fn test_signature_timeres() {
        assert_eq!(signature_timeres("gor a.gor | signature -timeres 60"), Some(60));
        assert_eq!(signature_timeres("gor a.gor | top 1"), None);
    }
}
