//! Anchor grammar scanner.
//!
//! A path is split into containers: a run of anchor characters, a name made
//! of `[A-Za-z0-9_-]`, then a fragment up to the next such run. The run length
//! gives the nesting depth. Text before the first run belongs to the main
//! container.

use tracing::trace;

/// One container cut out of the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContainerToken {
    pub name: String,
    /// Anchor count minus one; top-level containers sit at depth 0.
    pub depth: usize,
    /// Fragment normalized to `/` + trimmed text.
    pub fragment: String,
    /// Bytes of the original path this container accounts for.
    pub consumed: usize,
    pub is_client: bool,
}

struct RunStart {
    pos: usize,
    anchors: usize,
    name_start: usize,
    body_start: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn fragment(raw: &str) -> String {
    format!("/{}", raw.trim_matches('/'))
}

fn scan(body: &str, anchor: char) -> Vec<RunStart> {
    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let byte = |index: usize| chars.get(index).map_or(body.len(), |(pos, _)| *pos);

    let mut starts = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].1 != anchor {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < chars.len() && chars[i].1 == anchor {
            i += 1;
        }
        let name_start = i;
        while i < chars.len() && is_name_char(chars[i].1) {
            i += 1;
        }
        if i > name_start {
            starts.push(RunStart {
                pos: byte(run_start),
                anchors: name_start - run_start,
                name_start: byte(name_start),
                body_start: byte(i),
            });
        }
    }
    starts
}

/// Split `path` into containers, adding the main container when the path
/// does not open with it.
pub(crate) fn partition(path: &str, anchor: char, main_container: &str) -> Vec<ContainerToken> {
    let body = path.trim_start_matches('/');
    let lead = path.len() - body.len();
    let starts = scan(body, anchor);

    let mut tokens = Vec::new();
    let first_run = starts.first().map_or(body.len(), |s| s.pos);
    if first_run > 0 {
        tokens.push(ContainerToken {
            name: main_container.to_string(),
            depth: 0,
            fragment: fragment(&body[..first_run]),
            consumed: lead + first_run,
            is_client: true,
        });
    }

    for (index, start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).map_or(body.len(), |next| next.pos);
        let consumed = end - start.pos + if start.pos == 0 { lead } else { 0 };
        tokens.push(ContainerToken {
            name: body[start.name_start..start.body_start].to_string(),
            depth: start.anchors - 1,
            fragment: fragment(&body[start.body_start..end]),
            consumed,
            is_client: true,
        });
    }

    let needs_main = tokens
        .first()
        .map_or(true, |first| first.depth != 0 || first.name != main_container);
    if needs_main {
        let is_client = tokens.first().is_some_and(|first| first.depth == 1);
        tokens.insert(
            0,
            ContainerToken {
                name: main_container.to_string(),
                depth: 0,
                fragment: "/".to_string(),
                consumed: 0,
                is_client,
            },
        );
    }

    trace!(path, containers = tokens.len(), "partitioned path");
    tokens
}
