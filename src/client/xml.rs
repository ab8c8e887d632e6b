//! The flat `<xml><key>value</key>...</xml>` documents WeChat Pay exchanges.

use crate::error::GatewayError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

pub fn to_xml(params: &BTreeMap<String, String>) -> String {
    let mut out = String::from("<xml>");
    for (key, value) in params {
        out.push_str(&format!(
            "<{key}><![CDATA[{}]]></{key}>",
            value.replace("]]>", "]]]]><![CDATA[>")
        ));
    }
    out.push_str("</xml>");
    out
}

pub fn from_xml(raw: &[u8]) -> Result<BTreeMap<String, String>, GatewayError> {
    let malformed = |reason: String| GatewayError::MalformedPayload(reason);

    let mut reader = Reader::from_reader(raw);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut fields = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match depth {
                    1 if name == "xml" => saw_root = true,
                    1 => return Err(malformed(format!("unexpected root element <{}>", name))),
                    2 => {
                        fields.entry(name.clone()).or_insert_with(String::new);
                        current = Some(name);
                    }
                    _ => return Err(malformed("nested elements are not supported".to_string())),
                }
            }
            Ok(Event::Empty(e)) if depth == 1 => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                fields.insert(name, String::new());
            }
            Ok(Event::Text(t)) if depth == 2 => {
                let text = t.unescape().map_err(|e| malformed(e.to_string()))?;
                if let Some(name) = &current {
                    fields.entry(name.clone()).or_default().push_str(&text);
                }
            }
            Ok(Event::CData(c)) if depth == 2 => {
                let bytes = c.into_inner();
                let text = std::str::from_utf8(&bytes).map_err(|e| malformed(e.to_string()))?;
                if let Some(name) = &current {
                    fields.entry(name.clone()).or_default().push_str(text);
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(e.to_string())),
        }
        buf.clear();
    }

    if !saw_root || depth != 0 {
        return Err(malformed("missing or unterminated <xml> root".to_string()));
    }

    Ok(fields)
}
