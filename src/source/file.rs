// std
use std::path::{Path, PathBuf};
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::SourceId,
	source::{CredentialSource, SourceCredential, SourceError, SourceFuture},
};

/// Layout of a credential file.
///
/// Deserializes from the `format` object used by external account configurations, e.g.
/// `{"type": "json", "subject_token_field_name": "access_token"}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubjectTokenFormat {
	/// The whole file (trimmed) is the token.
	#[default]
	Text,
	/// The file is a JSON object and the token lives under one top-level field.
	Json {
		/// Field holding the token.
		subject_token_field_name: String,
	},
}

/// Token read from a file on every acquisition, so rotated files are picked up.
#[derive(Clone, Debug)]
pub struct FileSource {
	id: SourceId,
	path: PathBuf,
	format: SubjectTokenFormat,
}
impl FileSource {
	/// Reads a plain-text token from `path`.
	pub fn new(id: SourceId, path: impl Into<PathBuf>) -> Self {
		Self { id, path: path.into(), format: SubjectTokenFormat::Text }
	}

	/// Overrides the file format.
	pub fn with_format(mut self, format: SubjectTokenFormat) -> Self {
		self.format = format;

		self
	}

	/// Location of the credential file.
	pub fn path(&self) -> &Path {
		&self.path
	}
}
impl CredentialSource for FileSource {
	fn id(&self) -> &SourceId {
		&self.id
	}

	fn acquire(&self) -> SourceFuture<'_> {
		Box::pin(async move {
			let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
				SourceError::Io { path: self.path.display().to_string(), message: e.to_string() }
			})?;
			let token = extract_token(&content, &self.format)?;

			Ok(SourceCredential::new(self.id.clone(), token))
		})
	}
}

fn extract_token(content: &str, format: &SubjectTokenFormat) -> Result<String, SourceError> {
	let token = match format {
		SubjectTokenFormat::Text => content.trim().to_owned(),
		SubjectTokenFormat::Json { subject_token_field_name } => {
			let document: Value = serde_json::from_str(content)
				.map_err(|e| SourceError::Format { message: e.to_string() })?;

			match document.get(subject_token_field_name) {
				Some(Value::String(token)) => token.trim().to_owned(),
				_ =>
					return Err(SourceError::Format {
						message: format!(
							"field `{subject_token_field_name}` is missing or not a string"
						),
					}),
			}
		},
	};

	if token.is_empty() {
		return Err(SourceError::Format { message: "credential is empty".into() });
	}

	Ok(token)
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, fs};
	// self
	use super::*;

	fn id() -> SourceId {
		SourceId::new("file").expect("Source fixture should be valid.")
	}

	fn write_fixture(name: &str, content: &str) -> PathBuf {
		let path = env::temp_dir().join(format!("credential-broker-{}-{name}", std::process::id()));

		fs::write(&path, content).expect("Fixture file should be writable.");

		path
	}

	#[tokio::test]
	async fn reads_text_and_json_files() {
		let text = write_fixture("text", "subject-token\n");
		let json = write_fixture("json", r#"{"access_token":"subject-token","other":1}"#);
		let text_credential =
			FileSource::new(id(), &text).acquire().await.expect("Text file should parse.");
		let json_credential = FileSource::new(id(), &json)
			.with_format(SubjectTokenFormat::Json {
				subject_token_field_name: "access_token".into(),
			})
			.acquire()
			.await
			.expect("JSON file should parse.");

		assert_eq!(text_credential.token().expose(), "subject-token");
		assert_eq!(json_credential.token().expose(), "subject-token");

		let _ = fs::remove_file(text);
		let _ = fs::remove_file(json);
	}

	#[tokio::test]
	async fn missing_files_and_fields_fail() {
		let missing = FileSource::new(id(), "/nonexistent/credential-broker/token")
			.acquire()
			.await
			.expect_err("Missing files should fail.");

		assert!(matches!(missing, SourceError::Io { .. }));

		let format = SubjectTokenFormat::Json { subject_token_field_name: "id_token".into() };

		assert!(matches!(
			extract_token(r#"{"access_token":"x"}"#, &format),
			Err(SourceError::Format { .. })
		));
		assert!(matches!(extract_token("not json", &format), Err(SourceError::Format { .. })));
		assert!(matches!(
			extract_token("   ", &SubjectTokenFormat::Text),
			Err(SourceError::Format { .. })
		));
	}

	#[test]
	fn format_deserializes_from_external_account_shape() {
		let format: SubjectTokenFormat = serde_json::from_str(
			r#"{"type":"json","subject_token_field_name":"access_token"}"#,
		)
		.expect("Format object should deserialize.");

		assert_eq!(
			format,
			SubjectTokenFormat::Json { subject_token_field_name: "access_token".into() }
		);
	}
}
