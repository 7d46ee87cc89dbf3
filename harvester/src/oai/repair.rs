//! Textual repair of namespace declarations on the root element.
//!
//! Preservation-repository responses use `xip:` and `xsi:` prefixed elements
//! without always declaring them on the envelope, which namespace-aware XML
//! tooling rejects. The repair adds whichever of the expected declarations are
//! missing to the root start tag and leaves the rest of the text untouched.

use std::borrow::Cow;

pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";
pub const XIP_NAMESPACE: &str = "http://www.tessella.com/XIP/v4";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

const EXPECTED: [(&str, &str); 3] = [
    ("xmlns", OAI_NAMESPACE),
    ("xmlns:xip", XIP_NAMESPACE),
    ("xmlns:xsi", XSI_NAMESPACE),
];

pub fn repair_namespaces(xml: &str) -> Cow<'_, str> {
    let Some((name_end, tag_end)) = root_start_tag(xml) else {
        return Cow::Borrowed(xml);
    };

    let tag = &xml[..tag_end];
    let declared = &tag[name_end..];
    let missing: Vec<_> = EXPECTED
        .iter()
        .filter(|(attr, _)| !declares(declared, attr))
        .collect();

    if missing.is_empty() {
        return Cow::Borrowed(xml);
    }

    let mut repaired = String::with_capacity(xml.len() + 128);
    repaired.push_str(&xml[..name_end]);
    for (attr, uri) in missing {
        repaired.push(' ');
        repaired.push_str(attr);
        repaired.push_str("=\"");
        repaired.push_str(uri);
        repaired.push('"');
    }
    repaired.push_str(&xml[name_end..]);
    Cow::Owned(repaired)
}

/// Byte offsets of the end of the root element's name and the end of its start
/// tag (exclusive of `>`).
fn root_start_tag(xml: &str) -> Option<(usize, usize)> {
    let bytes = xml.as_bytes();
    let mut pos = 0;

    loop {
        let lt = pos + xml[pos..].find('<')?;
        let rest = &xml[lt..];
        if rest.starts_with("<?") {
            pos = lt + rest.find("?>")? + 2;
        } else if rest.starts_with("<!--") {
            pos = lt + rest.find("-->")? + 3;
        } else if rest.starts_with("<!") {
            pos = lt + rest.find('>')? + 1;
        } else {
            let name_start = lt + 1;
            let name_len = xml[name_start..]
                .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .unwrap_or(xml.len() - name_start);
            if name_len == 0 {
                return None;
            }
            let name_end = name_start + name_len;

            let mut quote: Option<u8> = None;
            for (i, &b) in bytes.iter().enumerate().skip(name_end) {
                match (quote, b) {
                    (Some(q), _) if b == q => quote = None,
                    (Some(_), _) => {}
                    (None, b'"') | (None, b'\'') => quote = Some(b),
                    (None, b'>') => {
                        let end = if i > 0 && bytes[i - 1] == b'/' { i - 1 } else { i };
                        return Some((name_end, end));
                    }
                    _ => {}
                }
            }
            return None;
        }
    }
}

fn declares(attributes: &str, attr: &str) -> bool {
    attributes.match_indices(attr).any(|(i, _)| {
        let before_ok = attributes[..i].ends_with(|c: char| c.is_whitespace());
        let after = attributes[i + attr.len()..].trim_start();
        before_ok && after.starts_with('=')
    })
}
