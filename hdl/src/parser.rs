//! Recursive descent over the block list, producing a `Document`.

use crate::block::is_delimiter;
use crate::{
    Attr, Bitmap, Constant, Document, Element, ParseError, Value, COLOR_MODE_MONO, NAME_MAX_LENGTH,
};
use log::{debug, warn};
use std::convert::TryFrom;
use std::error;
use std::path::{Path, PathBuf};

pub(crate) fn parse_blocks(
    blocks: &[String],
    base_dir: Option<&Path>,
) -> Result<Document, Box<dyn error::Error>> {
    let mut parser = Parser {
        blocks,
        pos: 0,
        base_dir,
        doc: Document::default(),
    };
    parser.parse()?;
    Ok(parser.doc)
}

struct Parser<'a> {
    blocks: &'a [String],
    pos: usize,
    base_dir: Option<&'a Path>,
    doc: Document,
}

impl<'a> Parser<'a> {
    fn current(&self) -> Result<&'a str, ParseError> {
        match self.blocks.get(self.pos) {
            Some(block) => Ok(block.as_str()),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn peek(&self, ahead: usize) -> Option<&'a str> {
        self.blocks.get(self.pos + ahead).map(|s| s.as_str())
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn parse(&mut self) -> Result<(), Box<dyn error::Error>> {
        let mut root_created = false;
        while self.pos < self.blocks.len() {
            let block = self.current()?;
            if block == "#" {
                self.bump();
                self.parse_definition()?;
            } else if block == "<" {
                if root_created {
                    return Err(ParseError::MultipleRoots.into());
                }
                root_created = true;
                self.parse_element(None)?;
            } else if block == "/" && self.peek(1) == Some("*") {
                self.skip_comment()?;
            } else {
                return Err(ParseError::UnexpectedBlock {
                    block: block.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    // The cursor sits on the '/' of an opening '/' '*' pair.
    fn skip_comment(&mut self) -> Result<(), ParseError> {
        self.bump();
        self.bump();
        loop {
            if self.current()? == "*" && self.peek(1) == Some("/") {
                self.bump();
                self.bump();
                return Ok(());
            }
            self.bump();
        }
    }

    fn parse_definition(&mut self) -> Result<(), Box<dyn error::Error>> {
        let keyword = self.current()?;
        match keyword {
            "const" => {
                self.bump();
                self.parse_constant()?;
                Ok(())
            }
            "img" => {
                self.bump();
                self.parse_bitmap()
            }
            _ => Err(ParseError::UnknownDefinition {
                name: keyword.to_string(),
            }
            .into()),
        }
    }

    /// Consumes a tag, key, constant or bitmap name.
    fn parse_name(&mut self) -> Result<String, ParseError> {
        let block = self.current()?;
        if is_delimiter_block(block) {
            return Err(ParseError::UnexpectedDelimiter {
                block: block.to_string(),
            });
        }
        if block.len() > NAME_MAX_LENGTH {
            return Err(ParseError::NameTooLong {
                name: block.to_string(),
            });
        }
        self.bump();
        Ok(block.to_string())
    }

    fn parse_constant(&mut self) -> Result<(), ParseError> {
        let name = self.parse_name()?;
        let value = self.parse_value()?;
        self.doc.constants.push(Constant {
            name,
            value,
            is_const: true,
        });
        Ok(())
    }

    /// Parses one value and leaves the cursor after it: an array, a string,
    /// a number (always FLOAT at this stage), a boolean, a `$` binding or a
    /// constant/bitmap reference.
    fn parse_value(&mut self) -> Result<Value, ParseError> {
        let block = self.current()?;
        if block == "[" {
            self.bump();
            return self.parse_array();
        }
        if block == "$" {
            self.bump();
            return self.parse_binding();
        }
        if is_delimiter_block(block) {
            return Err(ParseError::UnexpectedDelimiter {
                block: block.to_string(),
            });
        }
        if block.starts_with('"') || block.starts_with('\'') {
            let text = parse_string_block(block)?;
            self.bump();
            return Ok(Value::Str(text));
        }
        if is_number(block) {
            let value = block.parse::<f32>().map_err(|_| ParseError::UnexpectedBlock {
                block: block.to_string(),
            })?;
            self.bump();
            return Ok(Value::Float(vec![value]));
        }
        if block == "true" {
            self.bump();
            return Ok(Value::Bool(vec![true]));
        }
        if block == "false" {
            self.bump();
            return Ok(Value::Bool(vec![false]));
        }
        // A bare identifier names a constant first, then a bitmap.
        if let Some(constant) = self.doc.find_constant(block) {
            let value = constant.value.clone();
            self.bump();
            return Ok(value);
        }
        if let Some(index) = self.doc.find_bitmap(block) {
            self.bump();
            return Ok(Value::Img(vec![index as u8]));
        }
        Err(ParseError::UnknownIdentifier {
            name: block.to_string(),
        })
    }

    // '[' was consumed. All elements must share a type and strings are not
    // allowed; a constant reference contributes every element it holds.
    fn parse_array(&mut self) -> Result<Value, ParseError> {
        let mut acc = Value::Null;
        loop {
            if self.current()? == "]" {
                self.bump();
                break;
            }
            let item = self.parse_value()?;
            acc = merge_array_value(acc, item)?;
            let separator = self.current()?;
            if separator == "]" {
                self.bump();
                break;
            }
            if separator != "," {
                return Err(ParseError::ArraySeparator {
                    block: separator.to_string(),
                });
            }
            self.bump();
        }
        Ok(acc)
    }

    // '$' was consumed; the next block is an integer bind index or the name
    // of a FLOAT constant whose value becomes the index.
    fn parse_binding(&mut self) -> Result<Value, ParseError> {
        let block = self.current()?;
        if is_integer(block) {
            let index = match block.parse::<i64>() {
                Ok(value) => value as u8,
                Err(_) => {
                    warn!("bind index '{}' out of range", block);
                    0xFF
                }
            };
            self.bump();
            return Ok(Value::Bind(vec![index]));
        }
        let index = match self.doc.find_constant(block) {
            Some(constant) => match &constant.value {
                Value::Float(values) if !values.is_empty() => values[0] as u8,
                _ => {
                    warn!("binding '{}' does not name a numeric constant", block);
                    0xFF
                }
            },
            None => {
                warn!("could not resolve binding '{}'", block);
                0xFF
            }
        };
        self.bump();
        Ok(Value::Bind(vec![index]))
    }

    fn parse_attribute(&mut self) -> Result<Attr, ParseError> {
        let key = self.parse_name()?;
        let value = if self.peek(0) == Some("=") {
            self.bump();
            self.parse_value()?
        } else {
            // A bare key means a boolean flag.
            Value::Bool(vec![true])
        };
        Ok(Attr { key, value })
    }

    /// The cursor sits on the `<` that opens the element.
    fn parse_element(&mut self, parent: Option<u16>) -> Result<(), ParseError> {
        self.bump();
        let tag = self.parse_name()?;

        let index = self.doc.elements.len() as u16;
        self.doc.elements.push(Element {
            tag,
            content: None,
            attrs: Vec::new(),
            parent,
            children: Vec::new(),
        });
        if let Some(parent_index) = parent {
            self.doc.elements[parent_index as usize].children.push(index);
        }

        // Attribute list, up to '/>' (no body) or '>' (body follows).
        let has_body = loop {
            let block = self.current()?;
            if !is_delimiter_block(block) {
                let attr = self.parse_attribute()?;
                self.doc.elements[index as usize].attrs.push(attr);
                continue;
            }
            if block == "/" {
                self.bump();
                let block = self.current()?;
                if block != ">" {
                    return Err(ParseError::UnexpectedDelimiter {
                        block: block.to_string(),
                    });
                }
                self.bump();
                break false;
            } else if block == ">" {
                self.bump();
                break true;
            } else {
                return Err(ParseError::UnexpectedDelimiter {
                    block: block.to_string(),
                });
            }
        };

        if !has_body {
            return Ok(());
        }

        // Body: children and at most one text-content block, closed by a
        // matching end tag.
        loop {
            let block = self.current()?;
            if block == "<" {
                if self.peek(1) == Some("/") {
                    self.bump();
                    self.bump();
                    let close_tag = self.current()?;
                    if close_tag != self.doc.elements[index as usize].tag {
                        return Err(ParseError::TagMismatch {
                            open_tag: self.doc.elements[index as usize].tag.clone(),
                            close_tag: close_tag.to_string(),
                        });
                    }
                    self.bump();
                    let block = self.current()?;
                    if block != ">" {
                        return Err(ParseError::UnexpectedDelimiter {
                            block: block.to_string(),
                        });
                    }
                    self.bump();
                    return Ok(());
                }
                match self.peek(1) {
                    Some(next) if !is_delimiter_block(next) => {
                        self.parse_element(Some(index))?;
                    }
                    Some(next) => {
                        return Err(ParseError::UnexpectedDelimiter {
                            block: next.to_string(),
                        });
                    }
                    None => return Err(ParseError::UnexpectedEnd),
                }
            } else if is_delimiter_block(block) {
                return Err(ParseError::UnexpectedDelimiter {
                    block: block.to_string(),
                });
            } else {
                let element = &mut self.doc.elements[index as usize];
                if element.content.is_some() {
                    return Err(ParseError::MultipleContent {
                        tag: element.tag.clone(),
                    });
                }
                element.content = Some(block.to_string());
                self.bump();
            }
        }
    }

    fn parse_bitmap(&mut self) -> Result<(), Box<dyn error::Error>> {
        let name = self.parse_name()?;
        let mut bitmap = Bitmap {
            name,
            color_mode: COLOR_MODE_MONO,
            ..Bitmap::default()
        };

        let block = self.current()?;
        if block.starts_with('"') {
            self.load_bitmap_path(&mut bitmap)?;
            self.doc.bitmaps.push(bitmap);
            return Ok(());
        }
        if block != "(" {
            return Err(ParseError::BitmapDimensions {
                block: block.to_string(),
            }
            .into());
        }
        self.bump();

        bitmap.width = self.parse_dimension()?;
        let block = self.current()?;
        if block != "," {
            return Err(ParseError::BitmapDimensions {
                block: block.to_string(),
            }
            .into());
        }
        self.bump();
        bitmap.height = self.parse_dimension()?;

        let block = self.current()?;
        if block == "," {
            // Spritesheet tile dimensions.
            self.bump();
            bitmap.sprite_width = u8::try_from(self.parse_dimension()?).unwrap_or(u8::MAX);
            let block = self.current()?;
            if block != "," {
                return Err(ParseError::BitmapDimensions {
                    block: block.to_string(),
                }
                .into());
            }
            self.bump();
            bitmap.sprite_height = u8::try_from(self.parse_dimension()?).unwrap_or(u8::MAX);
        } else {
            bitmap.sprite_width = u8::try_from(bitmap.width).unwrap_or(u8::MAX);
            bitmap.sprite_height = u8::try_from(bitmap.height).unwrap_or(u8::MAX);
        }

        let block = self.current()?;
        if block != ")" {
            return Err(ParseError::BitmapParenthesis {
                block: block.to_string(),
            }
            .into());
        }
        self.bump();

        if let Ok(block) = self.current() {
            if block.starts_with('"') {
                self.load_bitmap_path(&mut bitmap)?;
                self.doc.bitmaps.push(bitmap);
                return Ok(());
            }
        }

        // Inline bit runs of '0'/'1', row-major MSB-first, up to ';'.
        let stride = bitmap.row_stride();
        let size = stride * bitmap.height as usize;
        bitmap.data = vec![0u8; size];
        let mut x = 0usize;
        let mut y = 0usize;
        while self.pos < self.blocks.len() {
            let block = self.current()?;
            if block.starts_with(';') {
                self.bump();
                break;
            }
            for bit in block.chars() {
                if y * stride + x / 8 >= size {
                    return Err(ParseError::BitmapOverflow {
                        name: bitmap.name.clone(),
                        size,
                    }
                    .into());
                }
                match bit {
                    '1' => bitmap.data[y * stride + x / 8] |= 1 << (7 - (x % 8)),
                    '0' => {}
                    _ => {
                        return Err(ParseError::BitmapData {
                            block: block.to_string(),
                        }
                        .into())
                    }
                }
                x += 1;
                if x >= bitmap.width as usize {
                    x = 0;
                    y += 1;
                }
            }
            self.bump();
        }

        debug!("bitmap '{}' built ({}B)", bitmap.name, bitmap.data.len());
        self.doc.bitmaps.push(bitmap);
        Ok(())
    }

    fn parse_dimension(&mut self) -> Result<u16, ParseError> {
        let block = self.current()?;
        let value = if is_integer(block) {
            block.parse::<i64>().ok()
        } else {
            None
        };
        match value {
            Some(value) if value >= 0 && value <= u16::MAX as i64 => {
                self.bump();
                Ok(value as u16)
            }
            _ => Err(ParseError::BitmapDimensions {
                block: block.to_string(),
            }),
        }
    }

    // The current block is a quoted path; loads the referenced BMP into
    // `bitmap`, resolving relative paths against the source directory.
    fn load_bitmap_path(&mut self, bitmap: &mut Bitmap) -> Result<(), Box<dyn error::Error>> {
        let block = self.current()?;
        let file = parse_string_block(block)?;
        self.bump();

        let path = match self.base_dir {
            Some(dir) => dir.join(&file),
            None => PathBuf::from(&file),
        };
        let mono = hdlbmp::load_mono_bmp(&path)?;
        bitmap.width = mono.width();
        bitmap.height = mono.height();
        bitmap.data = mono.into_data();
        if bitmap.sprite_width == 0 {
            bitmap.sprite_width = u8::try_from(bitmap.width).unwrap_or(u8::MAX);
        }
        if bitmap.sprite_height == 0 {
            bitmap.sprite_height = u8::try_from(bitmap.height).unwrap_or(u8::MAX);
        }
        Ok(())
    }
}

fn is_delimiter_block(block: &str) -> bool {
    let mut chars = block.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => is_delimiter(c),
        _ => false,
    }
}

// Strips the quotes off a quoted block, verifying the closing quote matches
// the opening one.
fn parse_string_block(block: &str) -> Result<String, ParseError> {
    let quote = match block.chars().next() {
        Some(quote) => quote,
        None => {
            return Err(ParseError::NoClosingQuote {
                block: block.to_string(),
            })
        }
    };
    let inner = &block[1..];
    if inner.is_empty() || !inner.ends_with(quote) {
        return Err(ParseError::NoClosingQuote {
            block: block.to_string(),
        });
    }
    Ok(inner[..inner.len() - 1].to_string())
}

fn merge_array_value(acc: Value, item: Value) -> Result<Value, ParseError> {
    if let Value::Str(_) = item {
        return Err(ParseError::StringInArray);
    }
    let merged = match (acc, item) {
        (Value::Null, item) => item,
        (Value::Bool(mut values), Value::Bool(more)) => {
            values.extend(more);
            Value::Bool(values)
        }
        (Value::Float(mut values), Value::Float(more)) => {
            values.extend(more);
            Value::Float(values)
        }
        (Value::Img(mut values), Value::Img(more)) => {
            values.extend(more);
            Value::Img(values)
        }
        (Value::Bind(mut values), Value::Bind(more)) => {
            values.extend(more);
            Value::Bind(values)
        }
        (acc, item) => {
            return Err(ParseError::ArrayTypeMismatch {
                expected: acc.kind(),
                found: item.kind(),
            })
        }
    };
    if merged.len() > u8::MAX as usize {
        return Err(ParseError::ArrayTooLong { len: merged.len() });
    }
    Ok(merged)
}

fn is_number(block: &str) -> bool {
    let mut has_digit = false;
    let mut has_point = false;
    for (i, c) in block.chars().enumerate() {
        match c {
            '-' if i == 0 => {}
            '.' if !has_point => has_point = true,
            '0'..='9' => has_digit = true,
            _ => return false,
        }
    }
    has_digit && !block.ends_with('.')
}

fn is_integer(block: &str) -> bool {
    let mut has_digit = false;
    for (i, c) in block.chars().enumerate() {
        match c {
            '-' if i == 0 => {}
            '0'..='9' => has_digit = true,
            _ => return false,
        }
    }
    has_digit
}
