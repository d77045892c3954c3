//! HTML markup -> document model, via `tl`.

use super::{DomError, Element};

/// Parse `markup` and append its top-level nodes under `root`.
pub(super) fn load_into(root: &Element, markup: &str) -> Result<(), DomError> {
    let dom = tl::parse(markup, tl::ParserOptions::default())
        .map_err(|e| DomError::Html(format!("{e:?}")))?;

    let parser = dom.parser();
    for handle in dom.children() {
        if let Some(el) = convert(*handle, parser) {
            root.append_child(&el);
        }
    }
    Ok(())
}

/// Convert a tl node to an element. Text and comments are folded away,
/// except that text directly inside an element becomes its `text`.
fn convert(handle: tl::NodeHandle, parser: &tl::Parser) -> Option<Element> {
    let tl::Node::Tag(tag) = handle.get(parser)? else {
        return None;
    };

    let tag_name = tag.name().as_utf8_str().to_lowercase();
    let el = Element::new(&tag_name);

    for (key, value) in tag.attributes().iter() {
        let key: &str = key.as_ref();
        let value = value.map(|v| v.to_string()).unwrap_or_default();
        el.set_attr(key, &value);
    }

    let mut text = String::new();
    for child in tag.children().top().iter() {
        match child.get(parser) {
            Some(tl::Node::Tag(_)) => {
                if let Some(child_el) = convert(*child, parser) {
                    el.append_child(&child_el);
                }
            }
            Some(tl::Node::Raw(bytes)) => text.push_str(&bytes.as_utf8_str()),
            _ => {}
        }
    }
    el.set_text(text.trim());

    init_form_state(&el);
    Some(el)
}

/// Seed the `value`/`checked` properties from markup, as a browser does.
fn init_form_state(el: &Element) {
    match el.tag() {
        "input" => {
            if let Some(value) = el.attr("value") {
                el.set_value(&value);
            }
            el.set_checked(el.has_attr("checked"));
        }
        "textarea" => el.set_value(&el.text()),
        _ => {}
    }
}
