// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Execution templates: target query, mutation, optional instance generation.
//!
//! Templates are parsed once when a rule catalog loads. The executor only
//! ever sees the typed AST; placeholders are resolved through
//! [`crate::binding::Bindings`], never by splicing text.
//!
//! Grammar:
//!
//! ```text
//! target      := relation "(" PH ")" [ "where" filter { "and" filter } ]
//! relation    := self | successors | predecessors | arrivals | instances | region | case
//! filter      := tokened | untokened
//! mutation    := statement { ";" statement } [ ";" ]
//! statement   := consume N | enable N | grant N from S | take S from N
//!              | absorb S from N | status N WORD | latch S | unlatch S
//!              | spawn %INSTANCES% | destroy N | void N | terminate %CASE%
//!              | stamp N %TXID%
//! instances   := spawn S over %ITEMS%
//! ```
//!
//! `S` is a single-node placeholder, `N` a single node or node set.
use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Typed template placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    /// The acting node.
    Subject,
    /// Resolved target set.
    Targets,
    /// Targets left over after a partial firing.
    Remaining,
    /// Structural successors of the acting node.
    Successors,
    /// Generated multiple-instance children.
    Instances,
    /// Item list driving instance generation.
    Items,
    /// Cancellation region of the acting node.
    Region,
    /// Owning case.
    Case,
    /// Current transaction.
    TxId,
}

impl Placeholder {
    /// Parses a placeholder name (without the `%` delimiters).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "SUBJECT" => Self::Subject,
            "TARGETS" => Self::Targets,
            "REMAINING" => Self::Remaining,
            "SUCCESSORS" => Self::Successors,
            "INSTANCES" => Self::Instances,
            "ITEMS" => Self::Items,
            "REGION" => Self::Region,
            "CASE" => Self::Case,
            "TXID" => Self::TxId,
            _ => return None,
        })
    }

    /// Placeholder name without delimiters.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Subject => "SUBJECT",
            Self::Targets => "TARGETS",
            Self::Remaining => "REMAINING",
            Self::Successors => "SUCCESSORS",
            Self::Instances => "INSTANCES",
            Self::Items => "ITEMS",
            Self::Region => "REGION",
            Self::Case => "CASE",
            Self::TxId => "TXID",
        }
    }

    /// Kind of value the placeholder binds.
    #[must_use]
    pub const fn kind(self) -> BindingKind {
        match self {
            Self::Subject => BindingKind::Node,
            Self::Targets | Self::Remaining | Self::Successors => BindingKind::Nodes,
            Self::Instances => BindingKind::Instances,
            Self::Items => BindingKind::Items,
            Self::Region => BindingKind::Region,
            Self::Case => BindingKind::Case,
            Self::TxId => BindingKind::Tx,
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}%", self.name())
    }
}

/// Kind of value bound to a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingKind {
    /// One node.
    Node,
    /// Ordered node set.
    Nodes,
    /// Generated instances.
    Instances,
    /// JSON items.
    Items,
    /// Region id.
    Region,
    /// Case id.
    Case,
    /// Transaction id.
    Tx,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Node => "a node",
            Self::Nodes => "a node set",
            Self::Instances => "instances",
            Self::Items => "items",
            Self::Region => "a region",
            Self::Case => "a case",
            Self::Tx => "a transaction id",
        })
    }
}

/// Which template string an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePart {
    /// Target query.
    Target,
    /// Mutation.
    Mutation,
    /// Instance generation.
    InstanceGeneration,
}

impl fmt::Display for TemplatePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Target => "target query",
            Self::Mutation => "mutation",
            Self::InstanceGeneration => "instance generation",
        })
    }
}

/// Malformed execution template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateParseError {
    /// Required template string is blank.
    #[error("{part} is empty")]
    Empty {
        /// Offending part.
        part: TemplatePart,
    },
    /// Token out of place.
    #[error("{part} at offset {offset}: unexpected {found}, expected {expected}")]
    Unexpected {
        /// Offending part.
        part: TemplatePart,
        /// Byte offset.
        offset: usize,
        /// What was found.
        found: String,
        /// What the parser wanted.
        expected: &'static str,
    },
    /// Name outside the closed vocabulary.
    #[error("{part} at offset {offset}: unknown {what} `{name}`")]
    Unknown {
        /// Offending part.
        part: TemplatePart,
        /// Byte offset.
        offset: usize,
        /// Vocabulary (relation, filter, statement, placeholder).
        what: &'static str,
        /// Offending name.
        name: String,
    },
    /// Placeholder of the wrong kind for its position.
    #[error("{part} at offset {offset}: {placeholder} binds {found}, expected {expected}")]
    ArgumentKind {
        /// Offending part.
        part: TemplatePart,
        /// Byte offset.
        offset: usize,
        /// Placeholder used.
        placeholder: Placeholder,
        /// Its kind.
        found: BindingKind,
        /// What the position accepts.
        expected: &'static str,
    },
}

/// Structural relation a target query selects through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The node itself.
    SelfNode,
    /// Structural successors.
    Successors,
    /// Structural predecessors.
    Predecessors,
    /// Senders of branch tokens waiting at the node.
    Arrivals,
    /// Live instance children.
    Instances,
    /// Members of a region.
    Region,
    /// Every node of the case.
    Case,
}

impl Relation {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "self" => Self::SelfNode,
            "successors" => Self::Successors,
            "predecessors" => Self::Predecessors,
            "arrivals" => Self::Arrivals,
            "instances" => Self::Instances,
            "region" => Self::Region,
            "case" => Self::Case,
            _ => return None,
        })
    }

    const fn argument(self) -> (&'static [BindingKind], &'static str) {
        match self {
            Self::Region => (REGION_ARG, "a region"),
            Self::Case => (CASE_ARG, "a case"),
            _ => (SUBJECT_ARG, "a single node"),
        }
    }
}

/// Post-selection filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFilter {
    /// Keep nodes that hold a token.
    Tokened,
    /// Keep nodes that hold no token.
    Untokened,
}

/// Parsed target query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetQuery {
    /// Relation.
    pub relation: Relation,
    /// Argument placeholder.
    pub argument: Placeholder,
    /// Filters, applied in order.
    pub filters: Vec<TargetFilter>,
}

/// One mutation statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Remove the node tokens (guarded).
    Consume(Placeholder),
    /// Give node tokens and mark `Enabled`.
    Enable(Placeholder),
    /// Route a token from `from` to each of `to`.
    Grant {
        /// Receivers.
        to: Placeholder,
        /// Sender.
        from: Placeholder,
    },
    /// Remove branch tokens from `from` waiting at `join` (guarded).
    Take {
        /// Join node.
        join: Placeholder,
        /// Senders.
        from: Placeholder,
    },
    /// Remove branch tokens and record them as absorbed.
    Absorb {
        /// Join node.
        join: Placeholder,
        /// Senders.
        from: Placeholder,
    },
    /// Replace the status label.
    Status {
        /// Nodes.
        node: Placeholder,
        /// New label.
        label: String,
    },
    /// Set the join latch.
    Latch(Placeholder),
    /// Clear the join latch and its absorbed set.
    Unlatch(Placeholder),
    /// Materialize generated instances.
    Spawn(Placeholder),
    /// Remove every triple about the nodes.
    Destroy(Placeholder),
    /// Cancel the nodes.
    Void(Placeholder),
    /// Mark the case terminated.
    Terminate(Placeholder),
    /// Record the firing transaction.
    Stamp {
        /// Nodes.
        node: Placeholder,
        /// Transaction placeholder.
        tx: Placeholder,
    },
}

impl Statement {
    fn placeholders(&self) -> Vec<Placeholder> {
        match self {
            Self::Consume(p)
            | Self::Enable(p)
            | Self::Status { node: p, .. }
            | Self::Latch(p)
            | Self::Unlatch(p)
            | Self::Spawn(p)
            | Self::Destroy(p)
            | Self::Void(p)
            | Self::Terminate(p) => vec![*p],
            Self::Grant { to: a, from: b }
            | Self::Take { join: a, from: b }
            | Self::Absorb { join: a, from: b }
            | Self::Stamp { node: a, tx: b } => vec![*a, *b],
        }
    }
}

/// Parsed mutation: statements applied in order to one delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    statements: Vec<Statement>,
}

impl Mutation {
    /// Statements in source order.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }
}

/// Parsed instance-generation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceQuery {
    /// Base node the children belong to.
    pub base: Placeholder,
    /// Item list iterated.
    pub items: Placeholder,
}

/// Immutable, pre-parsed execution template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTemplate {
    target: TargetQuery,
    mutation: Mutation,
    instance_generation: Option<InstanceQuery>,
}

impl ExecutionTemplate {
    /// Parses the three template strings.
    pub fn parse(
        target: &str,
        mutation: &str,
        instance_generation: Option<&str>,
    ) -> Result<Self, TemplateParseError> {
        Ok(Self {
            target: parse_target(target)?,
            mutation: parse_mutation(mutation)?,
            instance_generation: instance_generation.map(parse_instances).transpose()?,
        })
    }

    /// Target query.
    #[must_use]
    pub fn target(&self) -> &TargetQuery {
        &self.target
    }

    /// Mutation.
    #[must_use]
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    /// Instance generation, when declared.
    #[must_use]
    pub fn instance_generation(&self) -> Option<&InstanceQuery> {
        self.instance_generation.as_ref()
    }

    /// True when the mutation materializes generated instances.
    #[must_use]
    pub fn spawns_instances(&self) -> bool {
        self.mutation
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Spawn(_)))
    }

    /// Every placeholder referenced anywhere in the template.
    #[must_use]
    pub fn placeholders(&self) -> BTreeSet<Placeholder> {
        let mut out = BTreeSet::from([self.target.argument]);
        for statement in &self.mutation.statements {
            out.extend(statement.placeholders());
        }
        if let Some(gen) = &self.instance_generation {
            out.extend([gen.base, gen.items]);
        }
        out
    }
}

const SUBJECT_ARG: &[BindingKind] = &[BindingKind::Node];
const NODE_ARGS: &[BindingKind] = &[BindingKind::Node, BindingKind::Nodes];
const REGION_ARG: &[BindingKind] = &[BindingKind::Region];
const CASE_ARG: &[BindingKind] = &[BindingKind::Case];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Placeholder(&'a str),
    Open,
    Close,
    Semi,
}

impl Token<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Word(w) => format!("`{w}`"),
            Self::Placeholder(p) => format!("`%{p}%`"),
            Self::Open => "`(`".to_owned(),
            Self::Close => "`)`".to_owned(),
            Self::Semi => "`;`".to_owned(),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn lex(part: TemplatePart, src: &str) -> Result<Vec<(usize, Token<'_>)>, TemplateParseError> {
    let mut out = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => out.push((start, Token::Open)),
            ')' => out.push((start, Token::Close)),
            ';' => out.push((start, Token::Semi)),
            '%' => {
                let rest = &src[start + 1..];
                let Some(len) = rest.find('%') else {
                    return Err(TemplateParseError::Unexpected {
                        part,
                        offset: start,
                        found: "unterminated placeholder".to_owned(),
                        expected: "a closing `%`",
                    });
                };
                let name = &rest[..len];
                // Skip the name and the closing delimiter.
                for _ in 0..=name.chars().count() {
                    chars.next();
                }
                out.push((start, Token::Placeholder(name)));
            }
            c if is_word_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, n)) = chars.peek() {
                    if !is_word_char(n) {
                        break;
                    }
                    end = i + n.len_utf8();
                    chars.next();
                }
                out.push((start, Token::Word(&src[start..end])));
            }
            other => {
                return Err(TemplateParseError::Unexpected {
                    part,
                    offset: start,
                    found: format!("`{other}`"),
                    expected: "a word, placeholder, `(`, `)` or `;`",
                });
            }
        }
    }
    Ok(out)
}

struct Cursor<'a> {
    part: TemplatePart,
    tokens: Vec<(usize, Token<'a>)>,
    pos: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    fn new(part: TemplatePart, src: &'a str) -> Result<Self, TemplateParseError> {
        let tokens = lex(part, src)?;
        if tokens.is_empty() {
            return Err(TemplateParseError::Empty { part });
        }
        Ok(Self {
            part,
            tokens,
            pos: 0,
            end: src.len(),
        })
    }

    fn peek(&self) -> Option<(usize, Token<'a>)> {
        self.tokens.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn unexpected(&self, expected: &'static str) -> TemplateParseError {
        let (offset, found) = self
            .peek()
            .map_or_else(|| (self.end, "end of input".to_owned()), |(o, t)| (o, t.describe()));
        TemplateParseError::Unexpected {
            part: self.part,
            offset,
            found,
            expected,
        }
    }

    fn unknown(&self, offset: usize, what: &'static str, name: &str) -> TemplateParseError {
        TemplateParseError::Unknown {
            part: self.part,
            offset,
            what,
            name: name.to_owned(),
        }
    }

    fn word(&mut self, expected: &'static str) -> Result<(usize, &'a str), TemplateParseError> {
        match self.peek() {
            Some((offset, Token::Word(w))) => {
                self.pos += 1;
                Ok((offset, w))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn keyword(&mut self, keyword: &'static str) -> Result<(), TemplateParseError> {
        match self.peek() {
            Some((_, Token::Word(w))) if w == keyword => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.unexpected(keyword)),
        }
    }

    fn punct(
        &mut self,
        want: Token<'static>,
        expected: &'static str,
    ) -> Result<(), TemplateParseError> {
        match self.peek() {
            Some((_, tok)) if tok == want => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn placeholder(
        &mut self,
        accepts: &[BindingKind],
        expected: &'static str,
    ) -> Result<Placeholder, TemplateParseError> {
        match self.peek() {
            Some((offset, Token::Placeholder(name))) => {
                let Some(placeholder) = Placeholder::from_name(name) else {
                    return Err(self.unknown(offset, "placeholder", name));
                };
                if !accepts.contains(&placeholder.kind()) {
                    return Err(TemplateParseError::ArgumentKind {
                        part: self.part,
                        offset,
                        placeholder,
                        found: placeholder.kind(),
                        expected,
                    });
                }
                self.pos += 1;
                Ok(placeholder)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn finish(&self) -> Result<(), TemplateParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }
}

fn parse_target(src: &str) -> Result<TargetQuery, TemplateParseError> {
    let mut c = Cursor::new(TemplatePart::Target, src)?;
    let (offset, name) = c.word("a relation")?;
    let relation = Relation::from_name(name).ok_or_else(|| c.unknown(offset, "relation", name))?;
    c.punct(Token::Open, "`(`")?;
    let (accepts, expected) = relation.argument();
    let argument = c.placeholder(accepts, expected)?;
    c.punct(Token::Close, "`)`")?;
    let mut filters = Vec::new();
    if !c.at_end() {
        c.keyword("where")?;
        loop {
            let (offset, name) = c.word("a filter")?;
            filters.push(match name {
                "tokened" => TargetFilter::Tokened,
                "untokened" => TargetFilter::Untokened,
                _ => return Err(c.unknown(offset, "filter", name)),
            });
            if c.at_end() {
                break;
            }
            c.keyword("and")?;
        }
    }
    c.finish()?;
    Ok(TargetQuery {
        relation,
        argument,
        filters,
    })
}

fn parse_mutation(src: &str) -> Result<Mutation, TemplateParseError> {
    let mut c = Cursor::new(TemplatePart::Mutation, src)?;
    let mut statements = Vec::new();
    loop {
        statements.push(parse_statement(&mut c)?);
        if c.at_end() {
            break;
        }
        c.punct(Token::Semi, "`;`")?;
        if c.at_end() {
            break;
        }
    }
    Ok(Mutation { statements })
}

fn parse_statement(c: &mut Cursor<'_>) -> Result<Statement, TemplateParseError> {
    let (offset, verb) = c.word("a statement")?;
    let statement = match verb {
        "consume" => Statement::Consume(c.placeholder(NODE_ARGS, "a node set")?),
        "enable" => Statement::Enable(c.placeholder(NODE_ARGS, "a node set")?),
        "grant" => {
            let to = c.placeholder(NODE_ARGS, "a node set")?;
            c.keyword("from")?;
            let from = c.placeholder(SUBJECT_ARG, "a single node")?;
            Statement::Grant { to, from }
        }
        "take" | "absorb" => {
            let join = c.placeholder(SUBJECT_ARG, "a single node")?;
            c.keyword("from")?;
            let from = c.placeholder(NODE_ARGS, "a node set")?;
            if verb == "take" {
                Statement::Take { join, from }
            } else {
                Statement::Absorb { join, from }
            }
        }
        "status" => {
            let node = c.placeholder(NODE_ARGS, "a node set")?;
            let (_, label) = c.word("a status label")?;
            Statement::Status {
                node,
                label: label.to_owned(),
            }
        }
        "latch" => Statement::Latch(c.placeholder(SUBJECT_ARG, "a single node")?),
        "unlatch" => Statement::Unlatch(c.placeholder(SUBJECT_ARG, "a single node")?),
        "spawn" => Statement::Spawn(c.placeholder(&[BindingKind::Instances], "instances")?),
        "destroy" => Statement::Destroy(c.placeholder(NODE_ARGS, "a node set")?),
        "void" => Statement::Void(c.placeholder(NODE_ARGS, "a node set")?),
        "terminate" => Statement::Terminate(c.placeholder(CASE_ARG, "a case")?),
        "stamp" => {
            let node = c.placeholder(NODE_ARGS, "a node set")?;
            let tx = c.placeholder(&[BindingKind::Tx], "a transaction id")?;
            Statement::Stamp { node, tx }
        }
        _ => return Err(c.unknown(offset, "statement", verb)),
    };
    Ok(statement)
}

fn parse_instances(src: &str) -> Result<InstanceQuery, TemplateParseError> {
    let mut c = Cursor::new(TemplatePart::InstanceGeneration, src)?;
    c.keyword("spawn")?;
    let base = c.placeholder(SUBJECT_ARG, "a single node")?;
    c.keyword("over")?;
    let items = c.placeholder(&[BindingKind::Items], "items")?;
    c.finish()?;
    Ok(InstanceQuery { base, items })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sequence_template() {
        let template = ExecutionTemplate::parse(
            "successors(%SUBJECT%)",
            concat!(
                "consume %SUBJECT%; status %SUBJECT% Completed; ",
                "grant %TARGETS% from %SUBJECT%; stamp %SUBJECT% %TXID%",
            ),
            None,
        )
        .expect("template parses");
        assert_eq!(template.target().relation, Relation::Successors);
        assert_eq!(template.mutation().statements().len(), 4);
        assert_eq!(
            template.mutation().statements()[2],
            Statement::Grant {
                to: Placeholder::Targets,
                from: Placeholder::Subject
            }
        );
        assert!(!template.spawns_instances());
        assert_eq!(
            template.placeholders(),
            BTreeSet::from([Placeholder::Subject, Placeholder::Targets, Placeholder::TxId])
        );
    }

    #[test]
    fn parses_filters_and_instance_generation() {
        let template = ExecutionTemplate::parse(
            "self(%SUBJECT%) where tokened and tokened",
            "consume %SUBJECT%; spawn %INSTANCES%;",
            Some("spawn %SUBJECT% over %ITEMS%"),
        )
        .expect("template parses");
        assert_eq!(template.target().filters, vec![TargetFilter::Tokened; 2]);
        assert!(template.spawns_instances());
        assert_eq!(
            template.instance_generation().copied(),
            Some(InstanceQuery {
                base: Placeholder::Subject,
                items: Placeholder::Items
            })
        );
    }

    #[test]
    fn empty_parts_are_rejected() {
        let err =
            ExecutionTemplate::parse("self(%SUBJECT%)", "   ", None).expect_err("empty mutation");
        assert_eq!(
            err,
            TemplateParseError::Empty {
                part: TemplatePart::Mutation
            }
        );
        let err =
            ExecutionTemplate::parse("", "consume %SUBJECT%", None).expect_err("empty target");
        assert_eq!(
            err,
            TemplateParseError::Empty {
                part: TemplatePart::Target
            }
        );
    }

    #[test]
    fn errors_carry_offsets() {
        let err = ExecutionTemplate::parse("successors(%SUBJECT%", "consume %SUBJECT%", None)
            .expect_err("missing paren");
        assert_eq!(
            err,
            TemplateParseError::Unexpected {
                part: TemplatePart::Target,
                offset: 20,
                found: "end of input".to_owned(),
                expected: "`)`",
            }
        );

        let err = ExecutionTemplate::parse(
            "self(%SUBJECT%)",
            "consume %SUBJECT%; explode %SUBJECT%",
            None,
        )
        .expect_err("unknown statement");
        assert_eq!(
            err,
            TemplateParseError::Unknown {
                part: TemplatePart::Mutation,
                offset: 19,
                what: "statement",
                name: "explode".to_owned(),
            }
        );
    }

    #[test]
    fn placeholder_kinds_are_checked() {
        let err = ExecutionTemplate::parse("region(%SUBJECT%)", "void %TARGETS%", None)
            .expect_err("region needs a region placeholder");
        assert!(matches!(
            err,
            TemplateParseError::ArgumentKind {
                placeholder: Placeholder::Subject,
                ..
            }
        ));

        let err = ExecutionTemplate::parse("self(%SUBJECT%)", "consume %WHATEVER%", None)
            .expect_err("unknown placeholder");
        assert!(matches!(err, TemplateParseError::Unknown { what: "placeholder", .. }));
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        let err = ExecutionTemplate::parse("self(%SUBJECT)", "consume %SUBJECT%", None)
            .expect_err("unterminated");
        assert!(matches!(err, TemplateParseError::Unexpected { offset: 5, .. }));
    }
}
