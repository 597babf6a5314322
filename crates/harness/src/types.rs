use serde::{Deserialize, Serialize};

/// Browser engine used for launch and provisioning.
///
/// The harness drives engines over the DevTools protocol, so the supported
/// set enumerates the chromium-family channels that expose it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
	/// Open-source Chromium build.
	#[default]
	Chromium,
	/// Google Chrome (stable channel).
	Chrome,
	/// Microsoft Edge.
	Edge,
}

impl EngineKind {
	/// Supported engines, in default-preference order.
	pub const ALL: [EngineKind; 3] = [EngineKind::Chromium, EngineKind::Chrome, EngineKind::Edge];

	pub fn as_str(self) -> &'static str {
		match self {
			EngineKind::Chromium => "chromium",
			EngineKind::Chrome => "chrome",
			EngineKind::Edge => "edge",
		}
	}

	/// Engine name as the installer CLI expects it.
	pub fn installer_channel(self) -> &'static str {
		match self {
			EngineKind::Chromium => "chromium",
			EngineKind::Chrome => "chrome",
			EngineKind::Edge => "msedge",
		}
	}
}

impl std::fmt::Display for EngineKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for EngineKind {
	type Err = ParseEngineError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"chromium" => Ok(EngineKind::Chromium),
			"chrome" | "google-chrome" => Ok(EngineKind::Chrome),
			"edge" | "msedge" => Ok(EngineKind::Edge),
			other => Err(ParseEngineError(other.to_string())),
		}
	}
}

/// Error returned for an engine name outside the supported set.
#[derive(Debug, thiserror::Error)]
#[error("unknown browser engine: {0} (expected chromium, chrome, or edge)")]
pub struct ParseEngineError(pub String);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn engine_names_round_trip() {
		for engine in EngineKind::ALL {
			assert_eq!(engine.as_str().parse::<EngineKind>().unwrap(), engine);
		}
	}

	#[test]
	fn parse_accepts_aliases_and_case() {
		assert_eq!("Google-Chrome".parse::<EngineKind>().unwrap(), EngineKind::Chrome);
		assert_eq!(" MSEDGE ".parse::<EngineKind>().unwrap(), EngineKind::Edge);
	}

	#[test]
	fn parse_rejects_unknown_engine() {
		let err = "safari".parse::<EngineKind>().unwrap_err();
		assert!(err.to_string().contains("safari"));
	}

	#[test]
	fn default_is_first_of_supported_set() {
		assert_eq!(EngineKind::default(), EngineKind::ALL[0]);
	}

	#[test]
	fn installer_channel_uses_cli_names() {
		assert_eq!(EngineKind::Edge.installer_channel(), "msedge");
		assert_eq!(EngineKind::Chromium.installer_channel(), "chromium");
	}
}
