use super::arena::{Mounted, NodeArena, NodeId};

/// Attributes dropped from the output when their value is empty.
const OMIT_WHEN_EMPTY: &[&str] = &["id", "class", "title"];

/// Writes the mounted subtree at `id` as indented HTML.
pub(crate) fn encode(arena: &NodeArena, id: NodeId, out: &mut String) {
    encode_node(arena, id, 0, out);
}

fn encode_node(arena: &NodeArena, id: NodeId, depth: usize, out: &mut String) {
    let Some(slot) = arena.get(id) else {
        return;
    };

    match &slot.node {
        Mounted::Text(value) => {
            if !value.is_empty() {
                indent(depth, out);
                escape_into(value, out);
            }
        }
        Mounted::Raw(raw) => {
            indent(depth, out);
            out.push_str(&raw.source);
        }
        Mounted::Component(component) => encode_node(arena, component.root, depth, out),
        Mounted::Element(el) => {
            indent(depth, out);
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attributes {
                if value.is_empty() && OMIT_WHEN_EMPTY.contains(&name.as_str()) {
                    continue;
                }
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() && value != "true" {
                    out.push_str("=\"");
                    escape_into(value, out);
                    out.push('"');
                }
            }
            out.push('>');

            if el.self_closing {
                return;
            }

            match el.children.as_slice() {
                [] => {}
                [only] if matches!(arena.get(*only).map(|s| &s.node), Some(Mounted::Text(_))) => {
                    if let Some(Mounted::Text(value)) = arena.get(*only).map(|s| &s.node) {
                        escape_into(value, out);
                    }
                }
                children => {
                    for child in children {
                        out.push('\n');
                        encode_node(arena, *child, depth + 1, out);
                    }
                    out.push('\n');
                    indent(depth, out);
                }
            }

            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
