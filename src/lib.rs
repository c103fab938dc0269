//! Outline-notes domain library: a line-oriented markup parser that builds a
//! document tree, plus an agenda projection over many stored documents.
//! The parser keeps its core pure and total; storage is an opaque async
//! collaborator the agenda reads through.

pub mod core {
    use serde::{Deserialize, Serialize};

    /* ------------------------------ Inline spans ------------------------------ */

    /// A styled fragment of inline text. A line's content is an ordered run of
    /// spans following the original text, with adjacent plain runs merged.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Span {
        pub text: String,
        #[serde(rename = "type")]
        pub kind: SpanKind,
    }

    impl Span {
        pub fn new(text: impl Into<String>, kind: SpanKind) -> Self {
            Self {
                text: text.into(),
                kind,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum SpanKind {
        Text,
        Bold,
        Italic,
        Underline,
        Url,
        Timestamp,
    }

    /* ------------------------- Headline annotations ------------------------- */

    /// Workflow state keyword at the front of a headline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum State {
        Todo,
        Done,
    }

    /// Single-letter priority cookie, `[#A]` through `[#C]`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Priority {
        A,
        B,
        C,
    }

    /// Which planning marker a scheduling entry came from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum PlanningKind {
        Scheduled,
        Deadline,
    }

    impl PlanningKind {
        /// Raw line label, trailing colon included.
        pub fn label(self) -> &'static str {
            match self {
                PlanningKind::Scheduled => "SCHEDULED:",
                PlanningKind::Deadline => "DEADLINE:",
            }
        }
    }

    /// One `KIND: <timestamp>` pair from a planning line. The timestamp is
    /// kept raw, angle brackets and any recurrence cookie included.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PlanningEntry {
        pub kind: PlanningKind,
        pub timestamp: String,
    }

    /* --------------------------------- Nodes --------------------------------- */

    /// A classified line and, for headlines, the subtree hanging off it.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "kebab-case")]
    pub enum Node {
        Headline {
            /// Count of leading nesting markers; always >= 1.
            level: u8,
            state: Option<State>,
            priority: Option<Priority>,
            content: Vec<Span>,
            /// Raw trailing tag run, e.g. `:home:errand:`.
            tags: Option<String>,
            children: Vec<Node>,
        },
        Section {
            content: Vec<Span>,
        },
        Task {
            content: Vec<PlanningEntry>,
        },
        PropertyStart,
        PropertyEntry {
            key: String,
            value: String,
        },
        PropertyEnd,
    }

    /// A parsed document: its ordered root-level nodes. Built fresh on every
    /// parse; there is no incremental patching.
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Document {
        pub nodes: Vec<Node>,
    }
}

pub mod parser {
    //! Line classifier, inline span analyzer, and outline tree builder.
    //!
    //! Classification is an ordered rule list evaluated first-match-wins with
    //! an unconditional `Section` fallback, so `classify` is total: every
    //! input line yields exactly one node and nothing ever errors. The tree
    //! builder works over an index arena with an iterative insertion walk
    //! rather than recursing over live nested vectors.

    use crate::core::*;
    use chrono::{NaiveDate, NaiveTime};
    use nom::{
        IResult,
        branch::alt,
        bytes::complete::{tag, take_till, take_while, take_while1},
        character::complete::{char, digit1, one_of, space0, space1},
        combinator::{map_res, opt, recognize, value},
        error::{VerboseError, VerboseErrorKind},
        multi::many1,
        sequence::{delimited, pair, preceded, terminated, tuple},
    };

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* --------------------------- Public entry points --------------------------- */

    /// Parse a complete document: split into lines, classify each one, and
    /// assemble the resulting token stream into a tree.
    pub fn parse_document(text: &str) -> Document {
        build(text.lines().map(classify).collect())
    }

    /// Classify one line of text into a node skeleton.
    pub fn classify(line: &str) -> Node {
        if let Some(node) = headline(line) {
            return node;
        }
        if let Some(node) = planning(line) {
            return node;
        }
        if let Some(node) = property(line) {
            return node;
        }
        Node::Section {
            content: analyze(line),
        }
    }

    /// Parse a raw `<...>` timestamp literal into its date and optional time.
    pub fn parse_timestamp(raw: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
        match timestamp_body(raw) {
            Ok((rest, parts)) if rest.is_empty() => Some(parts),
            _ => None,
        }
    }

    /* ------------------------------- Headlines ------------------------------- */

    fn headline(line: &str) -> Option<Node> {
        let (rest, (level, state, priority)) = headline_prefix(line).ok()?;
        let (content_raw, tags) = split_trailing_tags(rest.trim_end());
        Some(Node::Headline {
            level,
            state,
            priority,
            content: analyze(content_raw),
            tags,
            children: Vec::new(),
        })
    }

    /// Marker run, state keyword, and priority cookie. The whitespace after
    /// the marker run is required: `**TODO ...` is not a headline and must
    /// fall through to the section rule.
    fn headline_prefix(i: &str) -> PResult<'_, (u8, Option<State>, Option<Priority>)> {
        let (i, stars) = recognize(many1(char('*')))(i)?;
        let (i, _) = space1(i)?;
        let (i, state) = opt(terminated(state_keyword, space1))(i)?;
        let (i, priority) = opt(terminated(priority_cookie, space1))(i)?;
        Ok((i, (stars.len() as u8, state, priority)))
    }

    fn state_keyword(i: &str) -> PResult<'_, State> {
        alt((
            value(State::Todo, tag("TODO")),
            value(State::Done, tag("DONE")),
        ))(i)
    }

    fn priority_cookie(i: &str) -> PResult<'_, Priority> {
        delimited(
            tag("[#"),
            alt((
                value(Priority::A, char('A')),
                value(Priority::B, char('B')),
                value(Priority::C, char('C')),
            )),
            char(']'),
        )(i)
    }

    /// Split a trailing `:tag1:tag2:` run off headline content. The run is
    /// the earliest colon-led suffix of word characters and colons reaching
    /// the end of the line.
    fn split_trailing_tags(content: &str) -> (&str, Option<String>) {
        if !content.ends_with(':') {
            return (content, None);
        }
        let tail_start = content
            .char_indices()
            .rev()
            .find(|(_, c)| !(is_word_char(*c) || *c == ':'))
            .map(|(pos, c)| pos + c.len_utf8())
            .unwrap_or(0);
        let tail = &content[tail_start..];
        for (idx, ch) in tail.char_indices() {
            if ch != ':' {
                continue;
            }
            let candidate = &tail[idx..];
            if is_tag_run(candidate) {
                let head = content[..tail_start + idx].trim_end();
                return (head, Some(candidate.to_string()));
            }
        }
        (content, None)
    }

    fn is_tag_run(s: &str) -> bool {
        let Some(inner) = s.strip_prefix(':').and_then(|s| s.strip_suffix(':')) else {
            return false;
        };
        !inner.is_empty()
            && inner
                .split(':')
                .all(|part| !part.is_empty() && part.chars().all(is_word_char))
    }

    fn is_word_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    /* ---------------------------- Planning lines ---------------------------- */

    /// A line made up entirely of `SCHEDULED:`/`DEADLINE:` timestamp pairs.
    fn planning(line: &str) -> Option<Node> {
        let mut rest = line;
        let mut entries = Vec::new();
        while let Ok((r, entry)) = planning_pair(rest) {
            entries.push(entry);
            rest = r;
        }
        if entries.is_empty() || !rest.trim().is_empty() {
            return None;
        }
        Some(Node::Task { content: entries })
    }

    fn planning_pair(i: &str) -> PResult<'_, PlanningEntry> {
        let (i, _) = space0(i)?;
        let (i, kind) = alt((
            value(PlanningKind::Scheduled, tag("SCHEDULED:")),
            value(PlanningKind::Deadline, tag("DEADLINE:")),
        ))(i)?;
        let (i, _) = space0(i)?;
        let (i, raw) = recognize(timestamp_body)(i)?;
        Ok((
            i,
            PlanningEntry {
                kind,
                timestamp: raw.to_string(),
            },
        ))
    }

    /* ------------------------------ Timestamps ------------------------------ */

    /// `<YYYY-MM-DD[ DOW][ HH:MM[:AM|PM]][ +Nd|++Nw|.+Nu]>`. The recurrence
    /// cookie is recognized but not interpreted.
    fn timestamp_body(i: &str) -> PResult<'_, (NaiveDate, Option<NaiveTime>)> {
        let (i, _) = char('<')(i)?;
        let (i, date) = date_literal(i)?;
        let (i, _) = opt(preceded(space1, take_while1(|c: char| c.is_alphabetic())))(i)?;
        let (i, time) = opt(preceded(space1, time_literal))(i)?;
        let (i, _) = opt(preceded(space1, recurrence_cookie))(i)?;
        let (i, _) = space0(i)?;
        let (i, _) = char('>')(i)?;
        Ok((i, (date, time)))
    }

    fn date_literal(i: &str) -> PResult<'_, NaiveDate> {
        map_res(
            tuple((
                map_res(digits_m_n(4, 4), |s: &str| s.parse::<i32>()),
                char('-'),
                map_res(digits_m_n(2, 2), |s: &str| s.parse::<u32>()),
                char('-'),
                map_res(digits_m_n(2, 2), |s: &str| s.parse::<u32>()),
            )),
            |(y, _, m, _, d)| NaiveDate::from_ymd_opt(y, m, d).ok_or("invalid date"),
        )(i)
    }

    /// Accepts both 24-hour `HH:MM` and 12-hour `HH:MM:AM` forms; the value
    /// is normalized to a 24-hour `NaiveTime`.
    fn time_literal(i: &str) -> PResult<'_, NaiveTime> {
        let (i, (hour, _, minute)) = tuple((
            map_res(digits_m_n(1, 2), |s: &str| s.parse::<u32>()),
            char(':'),
            map_res(digits_m_n(2, 2), |s: &str| s.parse::<u32>()),
        ))(i)?;
        let (i, meridiem) = opt(preceded(
            char(':'),
            alt((tag("AM"), tag("PM"), tag("am"), tag("pm"))),
        ))(i)?;
        let hour = match meridiem {
            Some(m) if m.eq_ignore_ascii_case("pm") && hour < 12 => hour + 12,
            Some(m) if m.eq_ignore_ascii_case("am") && hour == 12 => 0,
            _ => hour,
        };
        match NaiveTime::from_hms_opt(hour, minute, 0) {
            Some(t) => Ok((i, t)),
            None => Err(nom::Err::Error(VerboseError {
                errors: vec![(i, VerboseErrorKind::Context("time"))],
            })),
        }
    }

    fn recurrence_cookie(i: &str) -> PResult<'_, &str> {
        recognize(tuple((
            alt((tag("++"), tag(".+"), tag("+"))),
            digit1,
            one_of("ywmdh"),
        )))(i)
    }

    fn digits_m_n(m: usize, n: usize) -> impl for<'a> Fn(&'a str) -> PResult<'a, &'a str> {
        move |i: &str| {
            let (rest, out) = take_while(|c: char| c.is_ascii_digit())(i)?;
            if out.len() < m || out.len() > n {
                Err(nom::Err::Error(VerboseError {
                    errors: vec![(i, VerboseErrorKind::Context("digits"))],
                }))
            } else {
                Ok((rest, out))
            }
        }
    }

    /* ---------------------------- Property lines ---------------------------- */

    fn property(line: &str) -> Option<Node> {
        let trimmed = line.trim();
        if trimmed == ":PROPERTIES:" {
            return Some(Node::PropertyStart);
        }
        if trimmed == ":END:" {
            return Some(Node::PropertyEnd);
        }
        let (rest, key) = property_key(trimmed).ok()?;
        // `:Key:value` with no separator stays a section line.
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(Node::PropertyEntry {
            key: key.to_string(),
            value: rest.trim().to_string(),
        })
    }

    fn property_key(i: &str) -> PResult<'_, &str> {
        delimited(char(':'), take_while1(is_word_char), char(':'))(i)
    }

    /* ----------------------------- Inline spans ----------------------------- */

    #[derive(Debug, Clone, Copy)]
    enum RawToken<'a> {
        Timestamp(&'a str),
        Url(&'a str),
        Word(&'a str),
    }

    struct EmphasisRun<'a> {
        kind: SpanKind,
        marker: char,
        words: Vec<&'a str>,
    }

    /// Split free text into ordered styled spans. Tokens are scanned with
    /// priority timestamp > URL > emphasis; anything else accumulates into
    /// merged plain-text spans.
    ///
    /// Emphasis works per word: a word starting with `*`, `/`, or `_` opens a
    /// run, a word ending with the open marker closes it (one word may do
    /// both), a new marker while a run is open closes the current run in
    /// place, and a run still open at end of input demotes back to plain
    /// text. A timestamp or URL inside an open run flushes the words
    /// collected so far but leaves the run open.
    pub fn analyze(text: &str) -> Vec<Span> {
        let mut spans: Vec<Span> = Vec::new();
        let mut plain: Vec<&str> = Vec::new();
        let mut open: Option<EmphasisRun<'_>> = None;

        for token in raw_tokens(text) {
            match token {
                RawToken::Timestamp(s) => {
                    flush_before_atom(&mut spans, &mut plain, &mut open);
                    spans.push(Span::new(s, SpanKind::Timestamp));
                }
                RawToken::Url(s) => {
                    flush_before_atom(&mut spans, &mut plain, &mut open);
                    spans.push(Span::new(s, SpanKind::Url));
                }
                RawToken::Word(w) => match open.take() {
                    Some(mut run) => {
                        if w.ends_with(run.marker) {
                            run.words.push(w);
                            spans.push(Span::new(run.words.join(" "), run.kind));
                        } else if emphasis_marker(w).is_some() {
                            if !run.words.is_empty() {
                                spans.push(Span::new(run.words.join(" "), run.kind));
                            }
                            open = open_run(w, &mut spans);
                        } else {
                            run.words.push(w);
                            open = Some(run);
                        }
                    }
                    None => {
                        if emphasis_marker(w).is_some() {
                            flush_plain(&mut plain, &mut spans);
                            open = open_run(w, &mut spans);
                        } else {
                            plain.push(w);
                        }
                    }
                },
            }
        }

        // An unclosed run at end of input is plain text after all.
        if let Some(run) = open.take() {
            plain.extend(run.words);
        }
        flush_plain(&mut plain, &mut spans);
        coalesce_text(&mut spans);
        spans
    }

    fn raw_tokens(text: &str) -> Vec<RawToken<'_>> {
        let mut rest = text.trim_start();
        let mut out = Vec::new();
        while !rest.is_empty() {
            if let Ok((r, s)) = timestamp_token(rest) {
                out.push(RawToken::Timestamp(s));
                rest = r.trim_start();
                continue;
            }
            if let Ok((r, s)) = url_token(rest) {
                out.push(RawToken::Url(s));
                rest = r.trim_start();
                continue;
            }
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            out.push(RawToken::Word(&rest[..end]));
            rest = rest[end..].trim_start();
        }
        out
    }

    fn timestamp_token(i: &str) -> PResult<'_, &str> {
        recognize(timestamp_body)(i)
    }

    fn url_token(i: &str) -> PResult<'_, &str> {
        recognize(pair(
            alt((tag("http://"), tag("https://"))),
            take_till(|c: char| c.is_whitespace()),
        ))(i)
    }

    fn emphasis_marker(word: &str) -> Option<(SpanKind, char)> {
        match word.chars().next()? {
            '*' => Some((SpanKind::Bold, '*')),
            '/' => Some((SpanKind::Italic, '/')),
            '_' => Some((SpanKind::Underline, '_')),
            _ => None,
        }
    }

    /// Start a run at `word`, emitting it immediately when the word closes
    /// itself (e.g. `*bold*`).
    fn open_run<'a>(word: &'a str, spans: &mut Vec<Span>) -> Option<EmphasisRun<'a>> {
        let (kind, marker) = emphasis_marker(word)?;
        if word.len() > 1 && word.ends_with(marker) {
            spans.push(Span::new(word, kind));
            None
        } else {
            Some(EmphasisRun {
                kind,
                marker,
                words: vec![word],
            })
        }
    }

    fn flush_before_atom(
        spans: &mut Vec<Span>,
        plain: &mut Vec<&str>,
        open: &mut Option<EmphasisRun<'_>>,
    ) {
        match open.as_mut() {
            Some(run) => {
                if !run.words.is_empty() {
                    spans.push(Span::new(run.words.join(" "), run.kind));
                    run.words.clear();
                }
            }
            None => flush_plain(plain, spans),
        }
    }

    fn flush_plain(plain: &mut Vec<&str>, spans: &mut Vec<Span>) {
        if !plain.is_empty() {
            spans.push(Span::new(plain.join(" "), SpanKind::Text));
            plain.clear();
        }
    }

    fn coalesce_text(spans: &mut Vec<Span>) {
        let mut out: Vec<Span> = Vec::with_capacity(spans.len());
        for span in spans.drain(..) {
            match out.last_mut() {
                Some(prev) if prev.kind == SpanKind::Text && span.kind == SpanKind::Text => {
                    prev.text.push(' ');
                    prev.text.push_str(&span.text);
                }
                _ => out.push(span),
            }
        }
        *spans = out;
    }

    /* ------------------------------ Tree builder ------------------------------ */

    /// Assemble classified line fragments into a document tree.
    ///
    /// Placement follows the last entry of whichever list the walk currently
    /// points at. Note the deliberate sharp edge: a headline arriving at a
    /// list whose last entry is *deeper* than it is pushed as a sibling right
    /// there, without climbing back to a shallower ancestor list.
    pub fn build(tokens: Vec<Node>) -> Document {
        let mut arena = TreeArena::default();
        for node in tokens {
            // The very first fragment always lands at the root.
            if arena.roots.is_empty() {
                let id = arena.alloc(node);
                arena.roots.push(id);
                continue;
            }
            if let Node::Headline { level, .. } = &node {
                let level = *level;
                let id = arena.alloc(node);
                arena.place_headline(id, level);
            } else if matches!(node, Node::Task { .. }) {
                arena.place_task(node);
            } else {
                arena.place_body(node);
            }
        }
        Document {
            nodes: arena.materialize(),
        }
    }

    /// Where the insertion walk currently points: the root list or the child
    /// list of an arena node.
    #[derive(Debug, Clone, Copy)]
    enum ListRef {
        Roots,
        Children(usize),
    }

    /// Index arena for tree assembly. Payloads and child lists live in
    /// parallel vectors addressed by index, so placement is an iterative walk
    /// over index lists rather than recursion through nested structures.
    #[derive(Default)]
    struct TreeArena {
        nodes: Vec<Node>,
        children: Vec<Vec<usize>>,
        roots: Vec<usize>,
    }

    impl TreeArena {
        fn alloc(&mut self, node: Node) -> usize {
            self.nodes.push(node);
            self.children.push(Vec::new());
            self.nodes.len() - 1
        }

        fn list(&self, at: ListRef) -> &[usize] {
            match at {
                ListRef::Roots => &self.roots,
                ListRef::Children(id) => &self.children[id],
            }
        }

        fn push(&mut self, at: ListRef, id: usize) {
            match at {
                ListRef::Roots => self.roots.push(id),
                ListRef::Children(parent) => self.children[parent].push(id),
            }
        }

        fn headline_level(&self, id: usize) -> Option<u8> {
            match &self.nodes[id] {
                Node::Headline { level, .. } => Some(*level),
                _ => None,
            }
        }

        fn has_children(&self, id: usize) -> bool {
            !self.children[id].is_empty()
        }

        fn place_headline(&mut self, id: usize, level: u8) {
            if level == 1 {
                self.roots.push(id);
                return;
            }
            let mut at = ListRef::Roots;
            loop {
                let Some(&last) = self.list(at).last() else {
                    self.push(at, id);
                    return;
                };
                match self.headline_level(last) {
                    // Sibling after a non-headline, an equal level, or a
                    // deeper level (no climb back up).
                    None => {
                        self.push(at, id);
                        return;
                    }
                    Some(l) if l >= level => {
                        self.push(at, id);
                        return;
                    }
                    Some(_) if !self.has_children(last) => {
                        self.children[last].push(id);
                        return;
                    }
                    Some(_) => at = ListRef::Children(last),
                }
            }
        }

        /// Tasks follow the deepest open headline chain. A task reaching a
        /// childless headline attaches under it as-is; one arriving after
        /// other content at that depth is demoted to a section sibling.
        fn place_task(&mut self, node: Node) {
            let mut at = ListRef::Roots;
            loop {
                let Some(&last) = self.list(at).last() else {
                    let id = self.alloc(demote(node));
                    self.push(at, id);
                    return;
                };
                if self.headline_level(last).is_none() {
                    let id = self.alloc(demote(node));
                    self.push(at, id);
                    return;
                }
                if !self.has_children(last) {
                    let id = self.alloc(node);
                    self.children[last].push(id);
                    return;
                }
                at = ListRef::Children(last);
            }
        }

        /// Sections and property fragments: sibling after a childless node
        /// kind, first child of an empty headline, otherwise descend.
        fn place_body(&mut self, node: Node) {
            let id = self.alloc(node);
            let mut at = ListRef::Roots;
            loop {
                let Some(&last) = self.list(at).last() else {
                    self.push(at, id);
                    return;
                };
                if self.headline_level(last).is_none() {
                    self.push(at, id);
                    return;
                }
                if !self.has_children(last) {
                    self.children[last].push(id);
                    return;
                }
                at = ListRef::Children(last);
            }
        }

        fn materialize(self) -> Vec<Node> {
            let TreeArena {
                nodes,
                children,
                roots,
            } = self;
            let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
            // A child is always allocated after its parent headline, so a
            // reverse sweep sees every child list fully assembled before the
            // node that owns it. No recursion over the tree shape.
            for id in (0..slots.len()).rev() {
                if children[id].is_empty() {
                    continue;
                }
                let kids: Vec<Node> = children[id]
                    .iter()
                    .filter_map(|&child| slots[child].take())
                    .collect();
                if let Some(Node::Headline { children: slot, .. }) = slots[id].as_mut() {
                    *slot = kids;
                }
            }
            roots.iter().filter_map(|&id| slots[id].take()).collect()
        }
    }

    /// Turn a task into ordinary body text: each planning entry becomes a
    /// label span plus a timestamp span.
    fn demote(node: Node) -> Node {
        match node {
            Node::Task { content } => {
                let mut spans = Vec::with_capacity(content.len() * 2);
                for entry in content {
                    spans.push(Span::new(entry.kind.label(), SpanKind::Text));
                    spans.push(Span::new(entry.timestamp, SpanKind::Timestamp));
                }
                Node::Section { content: spans }
            }
            other => other,
        }
    }

}

pub mod storage {
    //! Asynchronous key-value collaborator the agenda reads documents from:
    //! enumerate names, fetch text by name. Implementations decide the
    //! medium; the agenda only ever awaits one fetch at a time.

    use anyhow::Result;
    use indexmap::IndexMap;
    use std::path::PathBuf;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum StoreError {
        #[error("document {0:?} not found")]
        NotFound(String),
        #[error(transparent)]
        Io(#[from] std::io::Error),
    }

    #[allow(async_fn_in_trait)]
    pub trait DocumentStore {
        /// All stored document names, in the store's enumeration order.
        async fn list(&self) -> Result<Vec<String>>;

        /// The full text of one document.
        async fn fetch(&self, name: &str) -> Result<String>;
    }

    /// In-memory store with insertion-ordered enumeration.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryStore {
        docs: IndexMap<String, String>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
            self.docs.insert(name.into(), text.into());
        }
    }

    impl DocumentStore for MemoryStore {
        async fn list(&self) -> Result<Vec<String>> {
            Ok(self.docs.keys().cloned().collect())
        }

        async fn fetch(&self, name: &str) -> Result<String> {
            match self.docs.get(name) {
                Some(text) => Ok(text.clone()),
                None => Err(StoreError::NotFound(name.to_string()).into()),
            }
        }
    }

    /// A directory of `.org` files; document names are file stems.
    #[derive(Debug, Clone)]
    pub struct DirStore {
        root: PathBuf,
    }

    impl DirStore {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        fn path_for(&self, name: &str) -> PathBuf {
            self.root.join(format!("{name}.org"))
        }
    }

    impl DocumentStore for DirStore {
        async fn list(&self) -> Result<Vec<String>> {
            let mut names = Vec::new();
            let mut dir = tokio::fs::read_dir(&self.root).await.map_err(StoreError::Io)?;
            while let Some(entry) = dir.next_entry().await.map_err(StoreError::Io)? {
                let path = entry.path();
                if path.extension().map(|ext| ext == "org").unwrap_or(false) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
            names.sort();
            Ok(names)
        }

        async fn fetch(&self, name: &str) -> Result<String> {
            let path = self.path_for(name);
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => Ok(text),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(StoreError::NotFound(name.to_string()).into())
                }
                Err(err) => Err(StoreError::Io(err).into()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::fs;

        #[tokio::test]
        async fn memory_store_keeps_insertion_order() {
            let mut store = MemoryStore::new();
            store.insert("zebra", "* z");
            store.insert("alpha", "* a");

            let names = store.list().await.expect("list");
            assert_eq!(names, vec!["zebra".to_string(), "alpha".to_string()]);
            assert_eq!(store.fetch("alpha").await.expect("fetch"), "* a");
        }

        #[tokio::test]
        async fn memory_store_reports_missing_documents() {
            let store = MemoryStore::new();
            let err = store.fetch("nope").await.expect_err("missing");
            assert!(err.downcast_ref::<StoreError>().is_some());
        }

        #[tokio::test]
        async fn dir_store_lists_and_fetches_org_files() {
            let tmp = tempfile::tempdir().expect("tempdir");
            fs::write(tmp.path().join("notes.org"), "* hello").expect("write notes");
            fs::write(tmp.path().join("ignore.txt"), "nope").expect("write ignore");

            let store = DirStore::new(tmp.path());
            let names = store.list().await.expect("list");
            assert_eq!(names, vec!["notes".to_string()]);
            assert_eq!(store.fetch("notes").await.expect("fetch"), "* hello");
            assert!(store.fetch("ignore").await.is_err());
        }
    }
}

pub mod agenda {
    //! Agenda projection: scan stored documents for scheduling lines sitting
    //! directly under a headline, then bucket the results into a 7-day week
    //! view around a reference date.

    use crate::core::{Node, PlanningKind, State};
    use crate::parser::{classify, parse_timestamp};
    use crate::storage::DocumentStore;
    use anyhow::{Context, Result};
    use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
    use serde::{Deserialize, Serialize};

    /// A resolved scheduling fact pulled out of one stored document.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AgendaEntry {
        pub file: String,
        /// Raw headline line owning the scheduling line.
        pub headline: String,
        /// Raw scheduling line.
        pub task: String,
        pub kind: PlanningKind,
        /// Workflow state parsed off the owning headline.
        pub state: Option<State>,
        pub date: NaiveDate,
        pub time: Option<NaiveTime>,
        /// Sort key; midnight when the timestamp carries no time.
        pub at: NaiveDateTime,
    }

    impl AgendaEntry {
        /// 12-hour clock rendering of the entry's time, e.g. `11:30:AM`.
        pub fn time_display(&self) -> Option<String> {
            self.time.map(|t| t.format("%I:%M:%p").to_string())
        }
    }

    /// One day of the week view with the tasks bucketed onto it.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct WeekDay {
        pub day: NaiveDate,
        pub tasks: Vec<AgendaEntry>,
    }

    /// Scan one document's text for scheduling lines directly below a
    /// headline. A scheduling line with no preceding headline line, including
    /// one at the very start of the document, is skipped rather than an
    /// error.
    pub fn scan_document(file: &str, text: &str) -> Vec<AgendaEntry> {
        let lines: Vec<&str> = text.lines().collect();
        let mut out = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let Node::Task { content } = classify(line) else {
                continue;
            };
            if idx == 0 {
                continue;
            }
            let above = lines[idx - 1];
            let Node::Headline { state, .. } = classify(above) else {
                continue;
            };
            let Some(first) = content.first() else {
                continue;
            };
            let Some((date, time)) = parse_timestamp(&first.timestamp) else {
                continue;
            };
            out.push(AgendaEntry {
                file: file.to_string(),
                headline: above.to_string(),
                task: line.to_string(),
                kind: first.kind,
                state,
                date,
                time,
                at: date.and_time(time.unwrap_or(NaiveTime::MIN)),
            });
        }
        out
    }

    /// Gather agenda entries across every stored document, most recent
    /// first. Documents are fetched one at a time; a failed fetch aborts the
    /// whole aggregation.
    pub async fn collect_entries(store: &impl DocumentStore) -> Result<Vec<AgendaEntry>> {
        let mut entries = Vec::new();
        for name in store.list().await.context("listing documents")? {
            let text = store
                .fetch(&name)
                .await
                .with_context(|| format!("fetching {name:?}"))?;
            entries.extend(scan_document(&name, &text));
        }
        entries.sort_by(|a, b| b.at.cmp(&a.at));
        Ok(entries)
    }

    /// The seven days of the week containing `reference`, starting on Sunday.
    pub fn week_of(reference: NaiveDate) -> [NaiveDate; 7] {
        let start = reference - Duration::days(reference.weekday().num_days_from_sunday() as i64);
        std::array::from_fn(|idx| start + Duration::days(idx as i64))
    }

    /// Bucket entries into the week containing `reference`. An entry whose
    /// headline still carries a TODO state also lands on the reference day,
    /// whatever its scheduled date, so overdue work keeps resurfacing.
    pub fn build_week_view(entries: &[AgendaEntry], reference: NaiveDate) -> Vec<WeekDay> {
        week_of(reference)
            .into_iter()
            .map(|day| {
                let mut tasks = Vec::new();
                for entry in entries {
                    if day == reference && entry.state == Some(State::Todo) {
                        tasks.push(entry.clone());
                        continue;
                    }
                    if entry.date == day {
                        tasks.push(entry.clone());
                    }
                }
                WeekDay { day, tasks }
            })
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::storage::MemoryStore;

        fn date(y: i32, m: u32, d: u32) -> NaiveDate {
            NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
        }

        #[test]
        fn scan_emits_entry_below_headline() {
            let text = "* TODO water the plants\nSCHEDULED: <2020-06-03 Wed 14:30>\n";
            let entries = scan_document("garden", text);
            assert_eq!(entries.len(), 1);
            let entry = &entries[0];
            assert_eq!(entry.file, "garden");
            assert_eq!(entry.headline, "* TODO water the plants");
            assert_eq!(entry.kind, PlanningKind::Scheduled);
            assert_eq!(entry.state, Some(State::Todo));
            assert_eq!(entry.date, date(2020, 6, 3));
            assert_eq!(entry.time_display().as_deref(), Some("02:30:PM"));
        }

        #[test]
        fn scan_skips_scheduling_line_at_start_of_document() {
            let entries = scan_document("notes", "SCHEDULED: <2020-06-03>\n* later headline\n");
            assert!(entries.is_empty());
        }

        #[test]
        fn scan_skips_orphan_scheduling_lines() {
            let text = "just some body text\nDEADLINE: <2020-06-03>\n";
            assert!(scan_document("notes", text).is_empty());
        }

        #[tokio::test]
        async fn collect_merges_and_sorts_descending() {
            let mut store = MemoryStore::new();
            store.insert("a", "* DONE old thing\nSCHEDULED: <2019-01-01>\n");
            store.insert("b", "* TODO new thing\nDEADLINE: <2021-05-05 Wed 09:00>\n");

            let entries = collect_entries(&store).await.expect("collect");
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].file, "b");
            assert_eq!(entries[1].file, "a");
        }

        #[tokio::test]
        async fn collect_aborts_on_fetch_failure() {
            struct FlakyStore;

            impl crate::storage::DocumentStore for FlakyStore {
                async fn list(&self) -> anyhow::Result<Vec<String>> {
                    Ok(vec!["gone".to_string()])
                }
                async fn fetch(&self, name: &str) -> anyhow::Result<String> {
                    Err(crate::storage::StoreError::NotFound(name.to_string()).into())
                }
            }

            assert!(collect_entries(&FlakyStore).await.is_err());
        }

        #[test]
        fn week_starts_on_sunday() {
            // 2020-06-03 was a Wednesday.
            let days = week_of(date(2020, 6, 3));
            assert_eq!(days[0], date(2020, 5, 31));
            assert_eq!(days[6], date(2020, 6, 6));
        }

        #[test]
        fn entries_bucket_onto_their_day() {
            let entries =
                scan_document("n", "* DONE done thing\nSCHEDULED: <2020-06-03 Wed 10:00>\n");
            let week = build_week_view(&entries, date(2020, 6, 1));
            // Wednesday is index 3 of a Sunday-started week.
            assert_eq!(week[3].tasks.len(), 1);
            let total: usize = week.iter().map(|d| d.tasks.len()).sum();
            assert_eq!(total, 1);
        }

        #[test]
        fn overdue_todo_resurfaces_today() {
            let entries = scan_document("n", "* TODO pay rent\nDEADLINE: <2018-01-01>\n");
            let reference = date(2020, 6, 3);
            let week = build_week_view(&entries, reference);
            let today = week.iter().find(|d| d.day == reference).expect("today");
            assert_eq!(today.tasks.len(), 1);
            // The stale date itself is outside this week, so nothing else.
            let total: usize = week.iter().map(|d| d.tasks.len()).sum();
            assert_eq!(total, 1);
        }

        #[test]
        fn todo_scheduled_today_is_not_duplicated() {
            let entries =
                scan_document("n", "* TODO standup\nSCHEDULED: <2020-06-03 Wed 09:30>\n");
            let reference = date(2020, 6, 3);
            let week = build_week_view(&entries, reference);
            let today = week.iter().find(|d| d.day == reference).expect("today");
            assert_eq!(today.tasks.len(), 1);
        }
    }
}

pub use parser::{analyze, build, classify, parse_document};
