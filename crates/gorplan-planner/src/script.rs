//! Script text to top-level tasks.
//!
//! ```text
//! create a = gor a.gor | top 10;
//! create b = pgor [a] -split 4 | group chrom -count;
//! gor [b] | sort genome
//! ```
//!
//! Each `create` becomes a task named `[a]`; the final statement becomes the
//! task named `[]` that produces the overall result.

use gorplan_core::query::{canonical_placeholder, quote_safe_split_trim};
use gorplan_core::{Error, Result, Task, TaskMap, TERMINAL_MARKER};

fn keyword<'a>(statement: &'a str, word: &str) -> Option<&'a str> {
    let head = statement.get(..word.len())?;
    let rest = &statement[word.len()..];
    (head.eq_ignore_ascii_case(word) && rest.starts_with(char::is_whitespace))
        .then(|| rest.trim_start())
}

pub fn parse_script(text: &str) -> Result<TaskMap> {
    let statements = quote_safe_split_trim(text, ';');
    let mut tasks = TaskMap::new();
    let mut final_query: Option<String> = None;

    for (i, statement) in statements.iter().enumerate() {
        if let Some(rest) = keyword(statement, "create") {
            let (name, query) = rest.split_once('=').ok_or_else(|| {
                Error::parsing(statement.as_str(), "expected 'create <name> = <query>'")
            })?;
            let name = canonical_placeholder(name)
                .ok_or_else(|| Error::parsing(statement.as_str(), "empty create name"))?;
            let query = query.trim();
            if query.is_empty() {
                return Err(Error::parsing(name, "empty query"));
            }
            if tasks.contains_key(&name) {
                return Err(Error::parsing(name, "duplicate create"));
            }
            tasks.insert(name.clone(), Task::new(name, query));
        } else if keyword(statement, "def").is_some() {
            return Err(Error::parsing(statement.as_str(), "definitions are not supported"));
        } else if i + 1 == statements.len() {
            final_query = Some(statement.clone());
        } else {
            return Err(Error::parsing(
                statement.as_str(),
                "only the last statement may be a plain query",
            ));
        }
    }

    let query =
        final_query.ok_or_else(|| Error::parsing(text.trim(), "script has no final query"))?;
    tasks.insert(
        TERMINAL_MARKER.to_string(),
        Task::final_query(TERMINAL_MARKER, query),
    );
    Ok(tasks)
}
