// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

/// This process's identity among the nodes sharing a database.
#[derive(Debug, Clone)]
pub struct NodeConfig {
	pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfigLayer {
	#[serde(default)]
	pub id: Option<String>,
}

impl NodeConfigLayer {
	pub fn merge(&mut self, other: NodeConfigLayer) {
		if other.id.is_some() {
			self.id = other.id;
		}
	}

	/// A node without a configured id gets a fresh random one, so two
	/// unconfigured processes never collide in the load registry.
	pub fn finalize(self) -> NodeConfig {
		NodeConfig {
			id: self
				.id
				.filter(|id| !id.trim().is_empty())
				.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_configured_id_is_kept() {
		let layer = NodeConfigLayer {
			id: Some("node-a".to_string()),
		};
		assert_eq!(layer.finalize().id, "node-a");
	}

	#[test]
	fn test_missing_id_is_random() {
		let a = NodeConfigLayer::default().finalize();
		let b = NodeConfigLayer { id: Some("  ".to_string()) }.finalize();
		assert!(uuid::Uuid::parse_str(&a.id).is_ok());
		assert_ne!(a.id, b.id);
	}
}
