// SPDX-License-Identifier: MIT OR Apache-2.0
//! Textual node and cable declarations.
//!
//! A composition is written as a `digraph G { ... }` block with one line per
//! node and one per cable:
//!
//! ```text
//! digraph G
//! {
//! MakeList1 [type="list.make.2.Integer" label="Make List|<refresh>refresh\l|<1>1\l|<2>2\l|<list>list\r" pos="10,20" size="140,78"];
//! MakeList1:list -> Count1:list;
//! }
//! ```

use crate::graph::Composition;
use crate::node::{Node, TintColor};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

const ESCAPED: &[char] = &['\\', '"', '|', '<', '>', '{', '}'];

/// One node line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDecl {
    /// Node identifier
    pub identifier: String,
    /// Node class name
    pub class_name: String,
    /// Title
    pub title: String,
    /// Input port names, as listed in the label
    pub inputs: Vec<String>,
    /// Output port names, as listed in the label
    pub outputs: Vec<String>,
    /// Position
    pub position: [f32; 2],
    /// Size
    pub size: [f32; 2],
    /// Optional tint
    pub tint: Option<TintColor>,
}

impl NodeDecl {
    /// Declaration of a composition node
    pub fn from_node(node: &Node) -> Self {
        Self {
            identifier: node.identifier.clone(),
            class_name: node.class.name.clone(),
            title: node.title.clone(),
            inputs: node.inputs.iter().map(|p| p.name().to_string()).collect(),
            outputs: node.outputs.iter().map(|p| p.name().to_string()).collect(),
            position: node.position,
            size: node.size,
            tint: node.tint,
        }
    }

    /// Render the declaration line
    pub fn to_line(&self) -> String {
        let mut label = escape(&self.title);
        for input in &self.inputs {
            let name = escape(input);
            let _ = write!(label, "|<{name}>{name}\\l");
        }
        for output in &self.outputs {
            let name = escape(output);
            let _ = write!(label, "|<{name}>{name}\\r");
        }

        let mut line = format!(
            "{} [type=\"{}\" label=\"{}\" pos=\"{},{}\" size=\"{},{}\"",
            self.identifier,
            self.class_name,
            label,
            self.position[0],
            self.position[1],
            self.size[0],
            self.size[1],
        );
        if let Some(tint) = self.tint {
            let _ = write!(line, " fillcolor=\"{}\"", tint.name());
        }
        line.push_str("];");
        line
    }
}

/// One cable line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDecl {
    /// Source node identifier
    pub from_node: String,
    /// Source port name
    pub from_port: String,
    /// Target node identifier
    pub to_node: String,
    /// Target port name
    pub to_port: String,
}

impl EdgeDecl {
    /// Render the declaration line
    pub fn to_line(&self) -> String {
        format!(
            "{}:{} -> {}:{};",
            self.from_node, self.from_port, self.to_node, self.to_port
        )
    }
}

/// A whole composition as declarations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositionDecl {
    /// Composition name (not part of the text)
    pub name: String,
    /// Node lines in order
    pub nodes: Vec<NodeDecl>,
    /// Cable lines in order
    pub edges: Vec<EdgeDecl>,
}

impl CompositionDecl {
    /// Declarations for every node and cable of a composition
    pub fn from_composition(composition: &Composition) -> Self {
        let nodes = composition.nodes().map(NodeDecl::from_node).collect();
        let edges = composition
            .connections()
            .filter_map(|c| {
                let ends = composition.endpoints(c)?;
                Some(EdgeDecl {
                    from_node: ends.from_node.identifier.clone(),
                    from_port: c.from_port.clone(),
                    to_node: ends.to_node.identifier.clone(),
                    to_port: c.to_port.clone(),
                })
            })
            .collect();
        Self {
            name: composition.name.clone(),
            nodes,
            edges,
        }
    }

    /// Render the `digraph` block
    pub fn to_text(&self) -> String {
        let mut text = String::from("digraph G\n{\n");
        for node in &self.nodes {
            text.push_str(&node.to_line());
            text.push('\n');
        }
        for edge in &self.edges {
            text.push_str(&edge.to_line());
            text.push('\n');
        }
        text.push_str("}\n");
        text
    }

    /// Parse a `digraph` block
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, DeclarationError> {
        let mut decl = Self {
            name: name.into(),
            ..Self::default()
        };
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty()
                || trimmed == "{"
                || trimmed == "}"
                || is_header(trimmed)
                || trimmed.starts_with("//")
            {
                continue;
            }
            if trimmed.contains('[') {
                decl.nodes.push(parse_node_line(line, trimmed)?);
            } else if trimmed.contains("->") {
                decl.edges.push(parse_edge_line(line, trimmed)?);
            } else {
                return Err(DeclarationError::Unexpected { line });
            }
        }
        Ok(decl)
    }
}

/// Declaration line of a single node
pub fn node_declaration(node: &Node) -> String {
    NodeDecl::from_node(node).to_line()
}

/// Declaration line of a single cable
pub fn edge_declaration(from: &Node, from_port: &str, to: &Node, to_port: &str) -> String {
    EdgeDecl {
        from_node: from.identifier.clone(),
        from_port: from_port.to_string(),
        to_node: to.identifier.clone(),
        to_port: to_port.to_string(),
    }
    .to_line()
}

/// Declaration parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// Node line that does not have the expected shape
    #[error("Line {line}: malformed node declaration: {reason}")]
    MalformedNode {
        /// Line number, starting at 1
        line: usize,
        /// What was wrong
        reason: &'static str,
    },

    /// Cable line that does not have the expected shape
    #[error("Line {line}: malformed cable declaration")]
    MalformedEdge {
        /// Line number, starting at 1
        line: usize,
    },

    /// Required attribute absent
    #[error("Line {line}: missing attribute {attribute}")]
    MissingAttribute {
        /// Line number, starting at 1
        line: usize,
        /// Attribute name
        attribute: &'static str,
    },

    /// `pos` or `size` not a pair of numbers
    #[error("Line {line}: invalid number pair {value:?}")]
    InvalidNumber {
        /// Line number, starting at 1
        line: usize,
        /// Attribute value
        value: String,
    },

    /// Unknown `fillcolor`
    #[error("Line {line}: unknown tint {value:?}")]
    UnknownTint {
        /// Line number, starting at 1
        line: usize,
        /// Attribute value
        value: String,
    },

    /// Line that is neither a node nor a cable
    #[error("Line {line}: unexpected content")]
    Unexpected {
        /// Line number, starting at 1
        line: usize,
    },
}

// `digraph`, `digraph G` or `digraph G {`
fn is_header(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("digraph") else {
        return false;
    };
    let name = rest.trim_end().trim_end_matches('{').trim();
    name.is_empty()
        || (rest.starts_with(char::is_whitespace)
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

// Declarations are line based, so line breaks are written as `\n` and `\r`
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => {
                if ESCAPED.contains(&c) {
                    out.push('\\');
                }
                out.push(c);
            }
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(next) => out.push(next),
            None => {}
        }
    }
    out
}

// Splits on unescaped separators, keeping escapes in the pieces
fn split_unescaped(text: &str, separator: char) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            piece.push(c);
            if let Some(next) = chars.next() {
                piece.push(next);
            }
        } else if c == separator {
            pieces.push(std::mem::take(&mut piece));
        } else {
            piece.push(c);
        }
    }
    pieces.push(piece);
    pieces
}

fn parse_attributes(line: usize, text: &str) -> Result<Vec<(String, String)>, DeclarationError> {
    let malformed = |reason| DeclarationError::MalformedNode { line, reason };
    let mut attributes = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
            key.push(c);
        }
        if key.is_empty() || chars.next() != Some('=') || chars.next() != Some('"') {
            return Err(malformed("expected key=\"value\""));
        }
        let mut value = String::new();
        loop {
            match chars.next() {
                Some('\\') => {
                    value.push('\\');
                    if let Some(next) = chars.next() {
                        value.push(next);
                    }
                }
                Some('"') => break,
                Some(c) => value.push(c),
                None => return Err(malformed("unterminated attribute value")),
            }
        }
        attributes.push((key, value));
    }
    Ok(attributes)
}

fn parse_pair(line: usize, value: &str) -> Result<[f32; 2], DeclarationError> {
    let invalid = || DeclarationError::InvalidNumber {
        line,
        value: value.to_string(),
    };
    let (x, y) = value.split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse().map_err(|_| invalid())?;
    let y = y.trim().parse().map_err(|_| invalid())?;
    Ok([x, y])
}

fn parse_label(line: usize, label: &str) -> Result<(String, Vec<String>, Vec<String>), DeclarationError> {
    let malformed = |reason| DeclarationError::MalformedNode { line, reason };
    let mut fields = split_unescaped(label, '|').into_iter();
    let title = unescape(&fields.next().unwrap_or_default());
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for field in fields {
        let (body, is_input) = if let Some(body) = field.strip_suffix("\\l") {
            (body, true)
        } else if let Some(body) = field.strip_suffix("\\r") {
            (body, false)
        } else {
            return Err(malformed("port field without alignment"));
        };
        let anchor = body
            .strip_prefix('<')
            .and_then(|rest| split_unescaped(rest, '>').into_iter().next())
            .ok_or(malformed("port field without anchor"))?;
        let name = unescape(&anchor);
        if is_input {
            inputs.push(name);
        } else {
            outputs.push(name);
        }
    }
    Ok((title, inputs, outputs))
}

fn parse_node_line(line: usize, text: &str) -> Result<NodeDecl, DeclarationError> {
    let malformed = |reason| DeclarationError::MalformedNode { line, reason };
    let (identifier, rest) = text.split_once('[').ok_or(malformed("missing '['"))?;
    let identifier = identifier.trim();
    if identifier.is_empty() || identifier.contains(char::is_whitespace) {
        return Err(malformed("invalid identifier"));
    }
    let body = rest
        .trim_end()
        .strip_suffix("];")
        .ok_or(malformed("missing '];'"))?;

    let attributes = parse_attributes(line, body)?;
    let get = |attribute: &'static str| {
        attributes
            .iter()
            .find(|(key, _)| key == attribute)
            .map(|(_, value)| value.as_str())
            .ok_or(DeclarationError::MissingAttribute { line, attribute })
    };

    let class_name = unescape(get("type")?);
    let (title, inputs, outputs) = parse_label(line, get("label")?)?;
    let position = parse_pair(line, get("pos")?)?;
    let size = parse_pair(line, get("size")?)?;
    let tint = match get("fillcolor") {
        Ok(value) => Some(TintColor::from_name(value).ok_or_else(|| {
            DeclarationError::UnknownTint {
                line,
                value: value.to_string(),
            }
        })?),
        Err(_) => None,
    };

    Ok(NodeDecl {
        identifier: identifier.to_string(),
        class_name,
        title,
        inputs,
        outputs,
        position,
        size,
        tint,
    })
}

fn parse_edge_line(line: usize, text: &str) -> Result<EdgeDecl, DeclarationError> {
    let malformed = || DeclarationError::MalformedEdge { line };
    let body = text.strip_suffix(';').ok_or_else(malformed)?;
    let (from, to) = body.split_once("->").ok_or_else(malformed)?;
    let (from_node, from_port) = from.trim().split_once(':').ok_or_else(malformed)?;
    let (to_node, to_port) = to.trim().split_once(':').ok_or_else(malformed)?;
    if [from_node, from_port, to_node, to_port]
        .iter()
        .any(|part| part.is_empty() || part.contains(char::is_whitespace))
    {
        return Err(malformed());
    }
    Ok(EdgeDecl {
        from_node: from_node.to_string(),
        from_port: from_port.to_string(),
        to_node: to_node.to_string(),
        to_port: to_port.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_class::NodeClass;
    use crate::port::PortClass;
    use std::sync::Arc;

    fn make_list_node() -> Node {
        let class = NodeClass::new("list.make.1.Integer", "Make List")
            .with_port(PortClass::input_data("1", "Integer"))
            .with_port(PortClass::output_data("list", "List_Integer"));
        Node::new(Arc::new(class), "MakeList1")
            .with_position(10.0, -20.5)
            .with_size(140.0, 60.0)
    }

    #[test]
    fn test_node_line() {
        let line = node_declaration(&make_list_node());
        assert_eq!(
            line,
            "MakeList1 [type=\"list.make.1.Integer\" label=\"Make List|<refresh>refresh\\l|<1>1\\l|<list>list\\r\" pos=\"10,-20.5\" size=\"140,60\"];"
        );
    }

    #[test]
    fn test_node_line_with_tint() {
        let node = make_list_node().with_tint(Some(TintColor::Magenta));
        assert!(node_declaration(&node).ends_with(" fillcolor=\"magenta\"];"));
    }

    #[test]
    fn test_edge_line() {
        let a = make_list_node();
        let b = make_list_node();
        assert_eq!(
            edge_declaration(&a, "list", &b, "1"),
            "MakeList1:list -> MakeList1:1;"
        );
    }

    #[test]
    fn test_title_escaping_round_trip() {
        let node = make_list_node()
            .with_title("a|b <c> {d} \"e\" \\f")
            .with_tint(Some(TintColor::Cyan));
        let decl = NodeDecl::from_node(&node);
        let parsed = parse_node_line(1, &decl.to_line()).unwrap();
        assert_eq!(parsed, decl);
    }

    #[test]
    fn test_multi_line_title_round_trip() {
        let node = make_list_node().with_title("first line\nsecond\r\nthird \\n");
        let decl = NodeDecl::from_node(&node);
        let line = decl.to_line();
        assert!(!line.contains('\n'));
        let parsed = CompositionDecl::parse("x", &format!("digraph G\n{{\n{line}\n}}\n")).unwrap();
        assert_eq!(parsed.nodes, vec![decl]);
    }

    #[test]
    fn test_identifier_starting_with_digraph() {
        let text = "digraph G {\n\
            digraphNode [type=\"x\" label=\"X\" pos=\"0,0\" size=\"1,1\"];\n\
            digraphNode:out -> Other:in;\n\
            }\n";
        let decl = CompositionDecl::parse("x", text).unwrap();
        assert_eq!(decl.nodes.len(), 1);
        assert_eq!(decl.nodes[0].identifier, "digraphNode");
        assert_eq!(decl.edges[0].from_node, "digraphNode");

        assert!(is_header("digraph"));
        assert!(is_header("digraph G"));
        assert!(is_header("digraph G {"));
        assert!(!is_header("digraphs"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_node_line(3, "A [type=\"x\" label=\"A\" pos=\"1,2\"];"),
            Err(DeclarationError::MissingAttribute {
                line: 3,
                attribute: "size"
            })
        );
        assert!(matches!(
            parse_node_line(1, "A [type=\"x\" label=\"A\" pos=\"1\" size=\"1,2\"];"),
            Err(DeclarationError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_node_line(1, "A [type=\"x\" label=\"A\" pos=\"1,2\" size=\"1,2\" fillcolor=\"blue\"];"),
            Err(DeclarationError::UnknownTint { .. })
        ));
        assert_eq!(
            parse_edge_line(2, "A:list -> B;"),
            Err(DeclarationError::MalformedEdge { line: 2 })
        );
        assert_eq!(
            CompositionDecl::parse("x", "digraph G\n{\nnonsense\n}\n"),
            Err(DeclarationError::Unexpected { line: 3 })
        );
    }

    #[test]
    fn test_composition_text() {
        let decl = CompositionDecl {
            name: "demo".to_string(),
            nodes: vec![NodeDecl::from_node(&make_list_node())],
            edges: vec![EdgeDecl {
                from_node: "MakeList1".to_string(),
                from_port: "list".to_string(),
                to_node: "Count1".to_string(),
                to_port: "list".to_string(),
            }],
        };
        let text = decl.to_text();
        assert!(text.starts_with("digraph G\n{\n"));
        assert!(text.ends_with("MakeList1:list -> Count1:list;\n}\n"));
        assert_eq!(CompositionDecl::parse("demo", &text).unwrap(), decl);
    }
}
