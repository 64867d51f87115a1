//! Multipart form bodies (`spec.md` §4.4 body rules: presence of `files`
//! switches to `multipart/form-data` with a `payload_json` part plus one
//! part per file, named `files[i]`).

use rand::{distributions::Alphanumeric, rngs::SmallRng, Rng, SeedableRng};

/// A single attached file.
#[derive(Clone, Debug)]
pub struct Attachment {
    /// File name sent in the part's `Content-Disposition`.
    pub filename: String,
    /// Raw file bytes.
    pub content: Vec<u8>,
}

/// A `multipart/form-data` body: JSON payload plus zero or more files.
#[derive(Clone, Debug, Default)]
pub struct Form {
    payload_json: Option<Vec<u8>>,
    files: Vec<Attachment>,
    boundary: Option<String>,
}

impl Form {
    /// Start a new, empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `payload_json` part.
    #[must_use]
    pub fn payload_json(mut self, payload_json: Vec<u8>) -> Self {
        self.payload_json = Some(payload_json);

        self
    }

    /// Append a file, named `files[{index}]` by its position among
    /// previously-added files.
    #[must_use]
    pub fn file(mut self, filename: impl Into<String>, content: Vec<u8>) -> Self {
        self.files.push(Attachment {
            filename: filename.into(),
            content,
        });

        self
    }

    /// Whether any files were attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.payload_json.is_none()
    }

    /// The `Content-Type` header value for this form's body, generating a
    /// boundary the first time it's called.
    pub fn content_type(&mut self) -> String {
        let boundary = self.boundary_or_generate().to_owned();

        format!("multipart/form-data; boundary={boundary}")
    }

    fn boundary_or_generate(&mut self) -> &str {
        self.boundary.get_or_insert_with(generate_boundary)
    }

    /// Serialize the form into its raw request body bytes.
    #[must_use]
    pub fn build(&mut self) -> Vec<u8> {
        let boundary = self.boundary_or_generate().to_owned();
        let mut body = Vec::new();

        if let Some(payload_json) = &self.payload_json {
            write_part(
                &mut body,
                &boundary,
                "payload_json",
                None,
                "application/json",
                payload_json,
            );
        }

        for (index, file) in self.files.iter().enumerate() {
            write_part(
                &mut body,
                &boundary,
                &format!("files[{index}]"),
                Some(&file.filename),
                "application/octet-stream",
                &file.content,
            );
        }

        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        body
    }
}

fn write_part(
    body: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    filename: Option<&str>,
    content_type: &str,
    content: &[u8],
) {
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());

    match filename {
        Some(filename) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
        ),
    }

    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");
}

/// 10 alphanumeric characters, matching the length the source ecosystem
/// picks for its multipart boundary generator.
fn generate_boundary() -> String {
    let rng = SmallRng::from_entropy();

    rng.sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::Form;

    #[test]
    fn empty_form_has_no_parts() {
        assert!(Form::new().is_empty());
    }

    #[test]
    fn build_includes_payload_json_and_indexed_files() {
        let mut form = Form::new()
            .payload_json(br#"{"content":"hi"}"#.to_vec())
            .file("a.txt", b"hello".to_vec())
            .file("b.txt", b"world".to_vec());

        let body = String::from_utf8(form.build()).unwrap();

        assert!(body.contains("name=\"payload_json\""));
        assert!(body.contains("name=\"files[0]\"; filename=\"a.txt\""));
        assert!(body.contains("name=\"files[1]\"; filename=\"b.txt\""));
        assert!(body.trim_end().ends_with("--"));
    }
}
