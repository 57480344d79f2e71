// Minimal multipart/form-data reader for buffered request bodies

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("content type is not multipart/form-data")]
    NotMultipart,

    #[error("multipart boundary missing")]
    MissingBoundary,

    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),
}

/// One form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    /// `None` when the field is a plain value rather than a file.
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Boundary parameter of a `multipart/form-data` content type.
pub fn boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut params = content_type.split(';');
    let mime = params.next().unwrap_or("").trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotMultipart);
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// `key=value` pairs after the first `;`. A `;` inside a quoted value does
/// not end it, and `\"` / `\\` are unescaped.
fn header_params(header: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = header.chars().skip_while(|&c| c != ';').peekable();

    // each pass starts on the ';' ending the previous parameter
    while chars.next().is_some() {
        let mut key = String::new();
        while let Some(c) = chars.next_if(|&c| c != '=' && c != ';') {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        while chars.next_if(|c| c.is_ascii_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => value.extend(chars.next()),
                    c => value.push(c),
                }
            }
            while chars.next_if(|&c| c != ';').is_some() {}
        } else {
            while let Some(c) = chars.next_if(|&c| c != ';') {
                value.push(c);
            }
            value.truncate(value.trim_end().len());
        }
        params.push((key.trim().to_string(), value));
    }
    params
}

/// Value of `key` in a `;`-separated header parameter list.
fn header_param(header: &str, key: &str) -> Option<String> {
    header_params(header)
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn parse_headers(block: &[u8]) -> Result<(String, Option<String>, Option<String>), MultipartError> {
    let text = std::str::from_utf8(block).map_err(|_| MultipartError::Malformed("non-utf8 part headers"))?;
    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in text.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        if key.trim().eq_ignore_ascii_case("content-disposition") {
            name = header_param(value, "name");
            filename = header_param(value, "filename");
        } else if key.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(value.to_string());
        }
    }
    let name = name.ok_or(MultipartError::Malformed("part without a field name"))?;
    Ok((name, filename, content_type))
}

/// Split a complete body into its parts.
pub fn parse(body: &[u8], boundary: &str) -> Result<Vec<Part>, MultipartError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let next_delimiter = format!("\r\n--{boundary}");
    let next_delimiter = next_delimiter.as_bytes();

    let mut pos = find(body, delimiter, 0).ok_or(MultipartError::Malformed("no opening boundary"))?
        + delimiter.len();
    let mut parts = Vec::new();

    loop {
        if body[pos..].starts_with(b"--") {
            return Ok(parts);
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(MultipartError::Malformed("boundary not followed by CRLF"));
        }
        pos += 2;

        let headers_end =
            find(body, b"\r\n\r\n", pos).ok_or(MultipartError::Malformed("unterminated part headers"))?;
        let (name, filename, content_type) = parse_headers(&body[pos..headers_end])?;
        let data_start = headers_end + 4;

        let data_end = find(body, next_delimiter, data_start)
            .ok_or(MultipartError::Malformed("missing closing boundary"))?;
        parts.push(Part {
            name,
            filename,
            content_type,
            data: body[data_start..data_end].to_vec(),
        });
        pos = data_end + next_delimiter.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "----objforgeBoundary7MA4YWxk";

    fn body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, data) in parts {
            out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        out
    }

    #[test]
    fn boundary_is_extracted() {
        let ct = format!("multipart/form-data; boundary={BOUNDARY}");
        assert_eq!(boundary(&ct).unwrap(), BOUNDARY);
        assert_eq!(
            boundary("multipart/form-data; boundary=\"abc\"").unwrap(),
            "abc"
        );
        assert_eq!(
            boundary("application/json"),
            Err(MultipartError::NotMultipart)
        );
        assert_eq!(
            boundary("multipart/form-data"),
            Err(MultipartError::MissingBoundary)
        );
    }

    #[test]
    fn parses_file_and_field_parts() {
        let raw = body(&[
            ("note", None, &b"hello"[..]),
            ("image", Some("cat.jpg"), &b"\xff\xd8binary\r\n--not-a-boundary"[..]),
        ]);
        let parts = parse(&raw, BOUNDARY).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "note");
        assert_eq!(parts[0].filename, None);
        assert_eq!(parts[0].data, b"hello");
        assert_eq!(parts[1].name, "image");
        assert_eq!(parts[1].filename.as_deref(), Some("cat.jpg"));
        assert_eq!(parts[1].content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(parts[1].data, b"\xff\xd8binary\r\n--not-a-boundary");
    }

    #[test]
    fn empty_filename_is_kept_empty() {
        let raw = body(&[("image", Some(""), &b""[..])]);
        let parts = parse(&raw, BOUNDARY).unwrap();
        assert_eq!(parts[0].filename.as_deref(), Some(""));
        assert!(parts[0].data.is_empty());
    }

    #[test]
    fn quoted_filename_keeps_semicolons_and_escapes() {
        let raw = b"--B\r\nContent-Disposition: form-data; name=\"image\"; filename=\"cat;v2.jpg\"\r\n\r\ndata\r\n--B--\r\n";
        let parts = parse(raw, "B").unwrap();
        assert_eq!(parts[0].name, "image");
        assert_eq!(parts[0].filename.as_deref(), Some("cat;v2.jpg"));
        assert_eq!(parts[0].data, b"data");

        let header = r#"form-data; name="image"; filename="say \"hi\"; ok.png""#;
        assert_eq!(
            header_param(header, "filename").as_deref(),
            Some(r#"say "hi"; ok.png"#)
        );
        assert_eq!(header_param("form-data; name=plain ; x", "name").as_deref(), Some("plain"));
        assert_eq!(header_param("form-data; name=\"image\"", "filename"), None);
    }

    #[test]
    fn truncated_body_is_malformed() {
        let mut raw = body(&[("image", Some("cat.jpg"), &b"data"[..])]);
        raw.truncate(raw.len() - BOUNDARY.len() - 8);
        assert!(matches!(
            parse(&raw, BOUNDARY),
            Err(MultipartError::Malformed(_))
        ));
    }
}
