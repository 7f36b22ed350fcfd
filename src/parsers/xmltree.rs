//! # XML 元素树与路径查询
//!
//! 基于 `quick-xml` 事件流的最小元素树：
//! - `read_subtree` 从事件流物化单个元素子树（流式路径使用）
//! - `parse_document` 容错地解析整个文档，截断处回收已完成前缀
//! - `select` 按 `tag` / `tag[@name='...']` 路径查询，对应
//!   vasprun.xml 的固定模式
//!
//! ## 依赖关系
//! - 被 `parsers/vasprun.rs`, `parsers/vasprun_stream.rs` 使用
//! - 使用 `quick-xml` crate

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, VaspexError};
use crate::models::{Mat33, MatX3};

/// 物化的 XML 元素
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    fn from_start(e: &BytesStart) -> Result<Element> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| xml_error(format!("bad attribute: {}", err)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| xml_error(format!("bad attribute value: {}", err)))?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Element {
            name,
            attrs,
            children: Vec::new(),
            text: String::new(),
        })
    }

    /// 属性值
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 第一个指定名称的子元素
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 全部指定名称的子元素
    pub fn children_named<'a, 'b>(
        &'a self,
        name: &'b str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 'b> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// 解析文本内容为浮点数序列（空白分隔）
    pub fn parse_floats(&self) -> Vec<f64> {
        self.text
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect()
    }

    /// 解析文本内容为三维矢量
    pub fn parse_v3(&self) -> Option<[f64; 3]> {
        let v = self.parse_floats();
        if v.len() >= 3 {
            Some([v[0], v[1], v[2]])
        } else {
            None
        }
    }
}

/// 路径查询的一步：标签名 + 可选的 name 属性过滤
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub tag: &'a str,
    pub name: Option<&'a str>,
}

/// `tag` 匹配
pub fn tag(t: &str) -> Step<'_> {
    Step { tag: t, name: None }
}

/// `tag[@name='...']` 匹配
pub fn named<'a>(t: &'a str, name: &'a str) -> Step<'a> {
    Step {
        tag: t,
        name: Some(name),
    }
}

/// 从 root 的子元素开始按路径收集全部匹配，文档序
pub fn select<'e>(root: &'e Element, steps: &[Step]) -> Vec<&'e Element> {
    let mut current = vec![root];
    for step in steps {
        let mut next = Vec::new();
        for elem in current {
            for child in elem.children_named(step.tag) {
                if let Some(want) = step.name {
                    if child.attr("name") != Some(want) {
                        continue;
                    }
                }
                next.push(child);
            }
        }
        current = next;
    }
    current
}

/// 将 `<varray>` 的 `<v>` 子元素收集为 Nx3 矩阵
pub fn varray_rows(varray: &Element) -> MatX3 {
    varray
        .children_named("v")
        .filter_map(|v| v.parse_v3())
        .collect()
}

/// 将恰好三行的 varray 解析为 3x3 矩阵
pub fn varray_mat33(varray: &Element) -> Option<Mat33> {
    let rows = varray_rows(varray);
    if rows.len() == 3 {
        Some([rows[0], rows[1], rows[2]])
    } else {
        None
    }
}

fn xml_error(reason: String) -> VaspexError {
    VaspexError::ParseError {
        format: "xml".to_string(),
        path: String::new(),
        reason,
    }
}

/// 从事件流物化一个元素子树
///
/// `start` 是已读到的起始事件；读取到对应的结束标签为止，
/// 流位置停在该子树之后。子树内截断（EOF）是错误，由调用方
/// 决定作为警告还是致命错误。
pub fn read_subtree<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<Element> {
    let mut stack = vec![Element::from_start(start)?];
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(Element::from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let elem = Element::from_start(e)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(elem);
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| xml_error(format!("bad text content: {}", e)))?;
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let done = match stack.pop() {
                    Some(e) => e,
                    None => return Err(xml_error("unbalanced end tag".to_string())),
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => return Ok(done),
                }
            }
            Ok(Event::Eof) => {
                let open = stack.last().map(|e| e.name.clone()).unwrap_or_default();
                return Err(xml_error(format!("stream ended inside <{}>", open)));
            }
            Err(e) => {
                return Err(xml_error(format!(
                    "error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
}

/// 容错地解析整个文档
///
/// 截断或格式错误处停止，已完成的前缀连同仍然打开的元素一起
/// 回收为部分树，并记录警告。完全无法恢复出根元素才是致命错误。
pub fn parse_document(bytes: &[u8], path: &str) -> Result<(Element, Vec<String>)> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut warnings = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match Element::from_start(e) {
                Ok(elem) => stack.push(elem),
                Err(e) => {
                    warnings.push(e.to_string());
                    break;
                }
            },
            Ok(Event::Empty(ref e)) => match Element::from_start(e) {
                Ok(elem) => match stack.last_mut() {
                    Some(parent) => parent.children.push(elem),
                    None => root = Some(elem),
                },
                Err(e) => {
                    warnings.push(e.to_string());
                    break;
                }
            },
            Ok(Event::Text(ref t)) => {
                if let Some(parent) = stack.last_mut() {
                    match t.unescape() {
                        Ok(text) => parent.text.push_str(&text),
                        Err(e) => warnings.push(format!("bad text content: {}", e)),
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some(done) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => root = Some(done),
                    }
                }
            }
            Ok(Event::Eof) => {
                if let Some(open) = stack.last() {
                    warnings.push(format!("document truncated inside <{}>", open.name));
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warnings.push(format!(
                    "parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
                break;
            }
        }
        buf.clear();
    }

    // 将仍然打开的元素并入父元素，保留截断前的全部内容
    while let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => root = Some(done),
        }
    }

    match root {
        Some(r) => Ok((r, warnings)),
        None => Err(VaspexError::ParseError {
            format: "xml".to_string(),
            path: path.to_string(),
            reason: "no root element could be recovered".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<modeling>
 <incar>
  <i name="NSW">   100 </i>
  <i name="POTIM">  1.5 </i>
 </incar>
 <structure name="finalpos">
  <varray name="positions">
   <v> 0.0 0.0 0.0 </v>
   <v> 1.0 1.0 1.0 </v>
  </varray>
 </structure>
</modeling>"#;

    #[test]
    fn test_parse_document_and_select() {
        let (doc, warnings) = parse_document(DOC.as_bytes(), "test").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(doc.name, "modeling");

        let nsw = select(&doc, &[tag("incar"), named("i", "NSW")]);
        assert_eq!(nsw.len(), 1);
        assert_eq!(nsw[0].text.trim(), "100");

        let pos = select(
            &doc,
            &[
                named("structure", "finalpos"),
                named("varray", "positions"),
                tag("v"),
            ],
        );
        assert_eq!(pos.len(), 2);
        assert_eq!(pos[1].parse_v3(), Some([1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_select_attr_filter_excludes() {
        let (doc, _) = parse_document(DOC.as_bytes(), "test").unwrap();
        let missing = select(&doc, &[tag("incar"), named("i", "ENCUT")]);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_truncated_document_recovers_prefix() {
        let truncated = r#"<modeling>
 <calculation><energy><i name="e_fr_energy"> -1.5 </i></energy></calculation>
 <calculation><energy><i name="e_fr_en"#;
        let (doc, warnings) = parse_document(truncated.as_bytes(), "test").unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(doc.name, "modeling");
        // 第一个完整的 calculation 保留
        let energies = select(
            &doc,
            &[tag("calculation"), tag("energy"), named("i", "e_fr_energy")],
        );
        assert_eq!(energies.len(), 1);
        assert_eq!(energies[0].parse_floats(), vec![-1.5]);
    }

    #[test]
    fn test_unparsable_document_is_fatal() {
        assert!(parse_document(b"", "empty").is_err());
    }

    #[test]
    fn test_read_subtree() {
        let xml = r#"<calculation><energy><i name="kinetic"> 2.5 </i></energy></calculation>"#;
        let mut reader = Reader::from_reader(xml.as_bytes());
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let elem = loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Start(ref e) if e.name().as_ref() == b"calculation" => {
                    break read_subtree(&mut reader, &e.to_owned()).unwrap();
                }
                Event::Eof => panic!("tag not found"),
                _ => {}
            }
        };
        assert_eq!(elem.name, "calculation");
        let kin = select(&elem, &[tag("energy"), named("i", "kinetic")]);
        assert_eq!(kin[0].parse_floats(), vec![2.5]);
    }

    #[test]
    fn test_read_subtree_truncated_is_error() {
        let xml = r#"<calculation><energy>"#;
        let mut reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let start = loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Start(ref e) if e.name().as_ref() == b"calculation" => break e.to_owned(),
                _ => {}
            }
        };
        assert!(read_subtree(&mut reader, &start).is_err());
    }
}
