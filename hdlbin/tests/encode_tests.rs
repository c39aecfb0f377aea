use hdl::{parse_document, ValueKind};
use hdlbin::{encode, encode_with_capacity, write_c_source, EncodeError};

const HEADER_LEN: usize = 16;

fn compile(source: &str) -> Vec<u8> {
    let doc = parse_document(source, None).unwrap();
    encode(&doc).unwrap()
}

// Walks the element records after the header and bitmaps, returning the
// record count found and the sum of all child-count bytes. Asserts the
// records cover the buffer exactly.
fn element_records(bytes: &[u8]) -> (usize, usize) {
    let bitmap_count = bytes[2] as usize;
    let element_count = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    let mut i = HEADER_LEN;
    for _ in 0..bitmap_count {
        let size = u16::from_le_bytes([bytes[i], bytes[i + 1]]) as usize;
        i += 7 + size;
    }
    let mut child_sum = 0usize;
    for _ in 0..element_count {
        i += 1; // tag
        while bytes[i] != 0 {
            i += 1;
        }
        i += 1;
        let attr_count = bytes[i];
        i += 1;
        for _ in 0..attr_count {
            let kind = ValueKind::new(bytes[i + 1]).unwrap();
            let count = bytes[i + 2] as usize;
            i += 3;
            if kind == ValueKind::String {
                while bytes[i] != 0 {
                    i += 1;
                }
                i += 1;
            } else {
                i += kind.wire_size() * count;
            }
        }
        child_sum += bytes[i] as usize;
        i += 1;
    }
    assert_eq!(i, bytes.len());
    (element_count, child_sum)
}

#[test]
fn minimal_box() {
    let bytes = compile("<box/>");
    assert_eq!(bytes.len(), 20);
    assert_eq!(&bytes[..6], &[0x00, 0x01, 0x00, 0x00, 0x01, 0x00][..]);
    assert_eq!(&bytes[6..16], &[0u8; 10][..]);
    assert_eq!(&bytes[16..], &[0x00, 0x00, 0x00, 0x00][..]);
}

#[test]
fn text_content() {
    let bytes = compile("<text>hello</text>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x01, b'h', b'e', b'l', b'l', b'o', 0x00, 0x00, 0x00][..]
    );
}

#[test]
fn integer_narrowed_attribute() {
    let bytes = compile("<box x=5/>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x00, 0x00, 0x01, 0x00, 0x04, 0x01, 0x05, 0x00][..]
    );
}

#[test]
fn align_rewrite() {
    let bytes = compile("<box align=\"top right\"/>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x00, 0x00, 0x01, 0x09, 0x04, 0x01, 0x21, 0x00][..]
    );
}

#[test]
fn flexdir_rewrite() {
    let bytes = compile("<box flexdir=\"row\"/>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x00, 0x00, 0x01, 0x05, 0x04, 0x01, 0x02, 0x00][..]
    );
}

#[test]
fn float_kept_array() {
    let bytes = compile("<box x=[1.5, 2, 3]/>");
    let mut expected = vec![0x00, 0x00, 0x01, 0x00, 0x02, 0x03];
    expected.extend_from_slice(&1.5f32.to_le_bytes());
    expected.extend_from_slice(&2.0f32.to_le_bytes());
    expected.extend_from_slice(&3.0f32.to_le_bytes());
    expected.push(0x00);
    assert_eq!(&bytes[HEADER_LEN..], &expected[..]);
}

#[test]
fn narrowing_boundary_constants() {
    let bytes = compile("#const a 127\n<box x=a/>");
    assert_eq!(bytes[HEADER_LEN + 4], ValueKind::I8 as u8);
    assert_eq!(bytes[HEADER_LEN + 6], 127);

    let bytes = compile("#const a 128\n<box x=a/>");
    assert_eq!(bytes[HEADER_LEN + 4], ValueKind::I16 as u8);
    assert_eq!(
        &bytes[HEADER_LEN + 6..HEADER_LEN + 8],
        &128i16.to_le_bytes()[..]
    );
}

#[test]
fn mixed_array_stays_float() {
    // A single fractional element keeps the whole array FLOAT.
    let bytes = compile("<box x=[1, 2.5, 3]/>");
    assert_eq!(bytes[HEADER_LEN + 4], ValueKind::Float as u8);
    assert_eq!(bytes.len(), HEADER_LEN + 6 + 12 + 1);
}

#[test]
fn unknown_attribute_dropped_and_count_decremented() {
    let bytes = compile("<box x=1 mystery=2 y=3/>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x00, 0x00, 0x02, 0x00, 0x04, 0x01, 0x01, 0x01, 0x04, 0x01, 0x03, 0x00][..]
    );
}

#[test]
fn bool_and_bind_attributes() {
    let bytes = compile("#const speed 3\n<box disabled bind=$speed/>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x00, 0x00, 0x02, 0x0B, 0x01, 0x01, 0x01, 0x06, 0x08, 0x01, 0x03, 0x00][..]
    );
}

#[test]
fn string_attribute_payload() {
    let bytes = compile("<text bind=\"label\"/>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x01, 0x00, 0x01, 0x06, 0x03, 0x01, b'l', b'a', b'b', b'e', b'l', 0x00, 0x00][..]
    );
}

#[test]
fn empty_array_is_null_with_no_payload() {
    let bytes = compile("<box x=[]/>");
    assert_eq!(
        &bytes[HEADER_LEN..],
        &[0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00][..]
    );
}

#[test]
fn bitmap_record() {
    let bytes = compile("#img dot (12,2)\n101000000001 010100000000 ;\n<box img=dot/>");
    assert_eq!(bytes[2], 1);
    assert_eq!(&bytes[16..18], &4u16.to_le_bytes()[..]);
    assert_eq!(&bytes[18..20], &12u16.to_le_bytes()[..]);
    assert_eq!(&bytes[20..22], &2u16.to_le_bytes()[..]);
    assert_eq!(bytes[22], 1);
    assert_eq!(&bytes[23..27], &[0xA0, 0x10, 0x50, 0x00][..]);
    assert_eq!(
        &bytes[27..],
        &[0x00, 0x00, 0x01, 0x07, 0x07, 0x01, 0x00, 0x00][..]
    );
}

#[test]
fn child_counts_sum_to_element_count_minus_one() {
    let bytes = compile("<box><box><text>a</text></box><box/><text>b</text></box>");
    let (count, child_sum) = element_records(&bytes);
    assert_eq!(count, 5);
    assert_eq!(child_sum, count - 1);
}

#[test]
fn attribute_payload_sizes_match_declared_types() {
    // The record walker asserts the records cover the buffer exactly, so
    // any payload-size mismatch shows up as a cursor drift.
    let source = "#img dot (8,1) ;\n<box x=[1000, 2] align=\"bottom center\" img=dot>\
                  <text flex=2 bind=\"t\">label</text></box>";
    let bytes = compile(source);
    let (count, child_sum) = element_records(&bytes);
    assert_eq!(count, 2);
    assert_eq!(child_sum, 1);
}

#[test]
fn unknown_tag_is_fatal() {
    let doc = parse_document("<panel/>", None).unwrap();
    let err = encode(&doc).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EncodeError>(),
        Some(EncodeError::UnknownTag { .. })
    ));
}

#[test]
fn buffer_exhaustion_fails_cleanly() {
    // 256x128 mono pixels are 4096 bytes of data alone, more than one page.
    let doc = parse_document("#img big (256,128) ;\n<box/>", None).unwrap();
    let err = encode(&doc).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EncodeError>(),
        Some(EncodeError::BufferExhausted { .. })
    ));
    assert!(encode_with_capacity(&doc, 8192).is_ok());
}

#[test]
fn encoding_is_deterministic() {
    let source = "#const pad 4\n#img dot (8,1)\n10000001 ;\n\
                  <box x=pad flexdir=\"col\"><text>hi</text></box>";
    assert_eq!(compile(source), compile(source));
}

#[test]
fn encoding_does_not_mutate_the_document() {
    let doc = parse_document("<box x=[1, 2] flexdir=\"row\"/>", None).unwrap();
    let first = format!("{:?}", doc);
    encode(&doc).unwrap();
    assert_eq!(format!("{:?}", doc), first);
}

#[test]
fn c_source_output() {
    let bytes = compile("<box/>");
    let mut out = Vec::new();
    write_c_source(&mut out, &bytes, 6, false).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("// HDL output file\n// Original size: 6B, Compiled size: 20B\n"));
    assert!(text.contains("unsigned char HDL_PAGE_OUTPUT[20] = {"));
    assert!(text.contains("0x00, 0x01, 0x00"));
    assert!(text.ends_with("\n};\n\n"));
}

#[test]
fn commented_c_source_annotates_fields() {
    let bytes = compile("#img dot (8,1)\n10000001 ;\n<box x=5><text>hi</text></box>");
    let mut out = Vec::new();
    write_c_source(&mut out, &bytes, 10, true).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("// File format version (major, minor)"));
    assert!(text.contains("// Bitmap size"));
    assert!(text.contains("// Attribute count"));
    assert!(text.contains("// Child count"));
    // Every emitted byte appears in the annotated rendering.
    for byte in &bytes {
        assert!(text.contains(&format!("0x{:02X}", byte)));
    }
}
