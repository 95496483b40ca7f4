//! Terraform file inspection.
//!
//! Terrastack does not evaluate Terraform; the only thing it needs from a
//! `.tf` file is the set of `module` blocks and their `source` attributes,
//! which drive the change-detection walk over local module dependencies.

use std::path::Path;

use anyhow::Result;

use crate::error::TerrastackError;

/// File extension of Terraform configuration files.
pub const TERRAFORM_EXT: &str = "tf";

/// A module declaration found in a Terraform file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// The raw `source` attribute value.
    pub source: String,
}

impl Module {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Whether the module source is a local directory reference.
    ///
    /// Anything else (registry address, VCS URL, S3 bucket, ...) is remote
    /// and assumed unchanged by the change detector.
    pub fn is_local(&self) -> bool {
        self.source.starts_with("./") || self.source.starts_with("../")
    }
}

/// Parses the `module` blocks of a Terraform file, returning one [`Module`]
/// per block, in file order.
///
/// Module blocks without a literal string `source` attribute are an error:
/// Terraform itself requires the source to be a literal, so anything else
/// means the file would not plan either.
pub fn parse_modules(path: &Path) -> Result<Vec<Module>> {
    let contents = std::fs::read_to_string(path).map_err(|err| TerrastackError::TfParseError {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let body: hcl::Body = hcl::parse(&contents).map_err(|err| TerrastackError::TfParseError {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut modules = Vec::new();
    for block in body.blocks() {
        if block.identifier() != "module" {
            continue;
        }
        let source = block
            .body()
            .attributes()
            .find(|attr| attr.key() == "source")
            .ok_or_else(|| TerrastackError::TfParseError {
                path: path.to_path_buf(),
                reason: "module block without \"source\" attribute".to_string(),
            })?;
        match source.expr() {
            hcl::Expression::String(source) => modules.push(Module::new(source.clone())),
            other => {
                return Err(TerrastackError::TfParseError {
                    path: path.to_path_buf(),
                    reason: format!("module \"source\" must be a string literal, got {other:?}"),
                }
                .into());
            }
        }
    }

    Ok(modules)
}
