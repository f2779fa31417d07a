/// Reader for Clover XML coverage reports.
///
/// Clover XML structure (as produced by PHPUnit, OpenClover, jest's clover
/// reporter, etc.):
///
///   <coverage generated="..." clover="4.x.x">
///     <project timestamp="..." name="...">
///       <package name="...">
///         <file name="/absolute/path/to/Foo.php">
///           <class name="Foo"><metrics .../></class>
///           <line num="3" type="method" name="doStuff" count="2"/>
///           <line num="4" type="stmt" count="2"/>
///           <metrics loc="16" ncloc="12" statements="4" coveredstatements="3" .../>
///         </file>
///       </package>
///     </project>
///   </coverage>
///
/// Files may sit directly under `<project>` or inside `<package>`. Only the
/// `<metrics>` and `<line>` elements that are direct children of `<file>`
/// belong to the file; class-level `<metrics>` are ignored. `<file>` carries
/// the absolute path in `name` (PHPUnit) or in `path` with `name` holding
/// the basename (jest). `path` wins when present.
use quick_xml::events::{BytesStart, Event};

use super::{get_attr, xml_err, xml_reader, Parser};
use crate::error::{CovwatchError, Result};
use crate::model::{FileFragment, RawLine, RawMetrics};

/// Clover XML format parser.
pub struct CloverParser;

impl Parser for CloverParser {
    fn parse(&self, input: &[u8]) -> Result<Vec<FileFragment>> {
        parse_file_list(input)
    }
}

/// Element nesting state while streaming through the document.
#[derive(Default)]
struct Cursor {
    /// Depth of the innermost open element (root is 1).
    depth: usize,
    /// Depth of the open `<project>` element, if inside one.
    project: Option<usize>,
    /// Open `<file>` element and its depth.
    file: Option<(usize, FileFragment)>,
    files: Vec<FileFragment>,
    seen_root: bool,
}

impl Cursor {
    /// Handle an opening (or self-closing) element found at `depth`.
    fn open(&mut self, e: &BytesStart<'_>, depth: usize) {
        self.seen_root = true;
        match e.name().as_ref() {
            // Only a `<project>` directly under the root holds file entries.
            b"project" if self.project.is_none() && depth == 2 => {
                self.project = Some(depth);
            }
            b"file" if self.project.is_some() && self.file.is_none() => {
                let name = get_attr(e, b"path")
                    .or_else(|| get_attr(e, b"name"))
                    .unwrap_or_default();
                self.file = Some((
                    depth,
                    FileFragment {
                        name,
                        ..Default::default()
                    },
                ));
            }
            b"metrics" => {
                if let Some(fragment) = self.child_of_file(depth) {
                    fragment.metrics = Some(RawMetrics {
                        loc: get_attr(e, b"loc"),
                        statements: get_attr(e, b"statements"),
                        covered_statements: get_attr(e, b"coveredstatements"),
                    });
                }
            }
            b"line" => {
                if let Some(fragment) = self.child_of_file(depth) {
                    fragment.lines.push(RawLine {
                        kind: get_attr(e, b"type"),
                        num: get_attr(e, b"num"),
                        count: get_attr(e, b"count"),
                    });
                }
            }
            _ => {}
        }
    }

    /// Handle the end of the element at `depth`.
    fn close(&mut self, depth: usize) {
        if matches!(self.file, Some((d, _)) if d == depth) {
            if let Some((_, fragment)) = self.file.take() {
                self.files.push(fragment);
            }
        }
        if self.project == Some(depth) {
            self.project = None;
        }
    }

    fn child_of_file(&mut self, depth: usize) -> Option<&mut FileFragment> {
        match self.file.as_mut() {
            Some((d, fragment)) if *d + 1 == depth => Some(fragment),
            _ => None,
        }
    }
}

/// Parse the list of `<file>` entries under `<project>`.
pub fn parse_file_list(input: &[u8]) -> Result<Vec<FileFragment>> {
    let mut reader = xml_reader(input);
    let mut buf = Vec::new();
    let mut cursor = Cursor::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(xml_err(e, &reader)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                cursor.depth += 1;
                let depth = cursor.depth;
                cursor.open(e, depth);
            }
            Ok(Event::Empty(ref e)) => {
                let depth = cursor.depth + 1;
                cursor.open(e, depth);
                cursor.close(depth);
            }
            Ok(Event::End(_)) => {
                let depth = cursor.depth;
                cursor.close(depth);
                cursor.depth = cursor.depth.saturating_sub(1);
            }
            _ => {}
        }
        buf.clear();
    }

    if !cursor.seen_root || cursor.depth != 0 {
        return Err(CovwatchError::Parse(format!(
            "unexpected end of document at position {}",
            reader.buffer_position()
        )));
    }

    Ok(cursor.files)
}
