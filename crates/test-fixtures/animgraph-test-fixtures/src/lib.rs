use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    skeletons: HashMap<String, String>,
    clips: HashMap<String, String>,
    graphs: HashMap<String, GraphEntry>,
}

/// A graph definition plus the assets it is meant to be built against.
#[derive(Debug, Deserialize)]
struct GraphEntry {
    definition: String,
    skeleton: String,
    /// Clip fixture names in data slot order.
    #[serde(default)]
    clips: Vec<String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod skeletons {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.skeletons.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.skeletons, "skeleton", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.skeletons, "skeleton", name)?;
        super::load_json(rel)
    }
}

pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        super::load_json(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        Ok(resolve_path(rel))
    }
}

pub mod graphs {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.graphs.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.graphs, "graph", name)?;
        read_to_string(&entry.definition)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.graphs, "graph", name)?;
        super::load_json(&entry.definition)
    }

    /// Skeleton fixture name the graph is authored against.
    pub fn skeleton(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.graphs, "graph", name)?;
        Ok(entry.skeleton.clone())
    }

    /// Clip fixture names bound to the graph's data slots, in slot order.
    pub fn clips(name: &str) -> Result<Vec<String>> {
        let entry = lookup(&MANIFEST.graphs, "graph", name)?;
        Ok(entry.clips.clone())
    }
}
