//! Compiled contract artifacts as written by the Hardhat compiler.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ethers::{
    abi::{Abi, Token},
    types::Bytes,
};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::errors::DeployError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Creation code: the bytecode followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, args: &[Token]) -> Result<Bytes, DeployError> {
        if self.bytecode.is_empty() {
            return Err(DeployError::Artifact {
                name: self.contract_name.clone(),
                source: anyhow!("artifact has no bytecode, the contract may be abstract"),
            });
        }
        let encoding_error = |source: ethers::abi::Error| DeployError::Encoding {
            contract: self.contract_name.clone(),
            source,
        };
        match self.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(self.bytecode.to_vec(), args)
                .map(Bytes::from)
                .map_err(encoding_error),
            None if args.is_empty() => Ok(self.bytecode.clone()),
            None => Err(encoding_error(ethers::abi::Error::InvalidData)),
        }
    }
}

pub trait ArtifactSource: Send + Sync {
    fn load(&self, contract_name: &str) -> Result<ContractArtifact, DeployError>;
}

/// Artifact directory laid out as `<root>/contracts/<Name>.sol/<Name>.json`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, contract_name: &str) -> Result<PathBuf> {
        let file_name = format!("{contract_name}.json");
        let conventional = self
            .root
            .join("contracts")
            .join(format!("{contract_name}.sol"))
            .join(&file_name);
        if conventional.is_file() {
            return Ok(conventional);
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.with_context(|| format!("failed to walk {}", self.root.display()))?;
            let path = entry.path();
            if entry.file_type().is_file()
                && entry.file_name() == file_name.as_str()
                && path
                    .parent()
                    .and_then(Path::extension)
                    .is_some_and(|ext| ext == "sol")
            {
                found.push(entry.into_path());
            }
        }
        match found.len() {
            0 => Err(anyhow!(
                "no {} found under {}",
                file_name,
                self.root.display()
            )),
            1 => Ok(found.remove(0)),
            _ => Err(anyhow!(
                "multiple artifacts named {} under {}",
                file_name,
                self.root.display()
            )),
        }
    }
}

impl ArtifactSource for ArtifactStore {
    fn load(&self, contract_name: &str) -> Result<ContractArtifact, DeployError> {
        let load = || -> Result<ContractArtifact> {
            let path = self.locate(contract_name)?;
            log::debug!("loading artifact {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))
        };
        load().map_err(|source| DeployError::Artifact {
            name: contract_name.to_string(),
            source,
        })
    }
}
