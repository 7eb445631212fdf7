use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, TileWalkError};

/// Configuration keys that name another tile.
const REFERENCE_FIELDS: [&str; 4] = ["next_tile", "true_tile", "false_tile", "jump_target"];

/// One tile of a workflow graph, as declared in its definition.
///
/// The type is kept as the declared string; it is resolved against the
/// known tile kinds only when the tile is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDefinition {
    /// Unique identifier within the graph.
    #[serde(default)]
    pub id: String,
    /// Declared tile type, e.g. `LogicBuilderTile`.
    #[serde(rename = "type", default)]
    pub tile_type: String,
    /// Human-readable name.
    #[serde(default = "default_tile_name")]
    pub name: String,
    /// Type-specific configuration.
    #[serde(default)]
    pub configuration: Map<String, Value>,
}

fn default_tile_name() -> String {
    "UnnamedTile".to_string()
}

impl TileDefinition {
    /// Create a tile definition with an empty configuration.
    pub fn new(id: impl Into<String>, tile_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tile_type: tile_type.into(),
            configuration: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the configuration from a JSON object; other values are ignored.
    pub fn with_configuration(mut self, configuration: Value) -> Self {
        if let Value::Object(map) = configuration {
            self.configuration = map;
        }
        self
    }
}

/// Serialized shape of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub workflow_name: Option<String>,
    pub start_tile: String,
    /// Legacy parallel array of ids, used for tiles that omit `id`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tileids: Vec<String>,
    #[serde(default)]
    pub tiles: Vec<TileDefinition>,
}

/// A reference from a tile (or the graph entry) to a tile id that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DanglingReference {
    /// Referencing tile, `None` for the graph's `start_tile`.
    pub tile_id: Option<String>,
    pub field: String,
    pub target: String,
}

/// A validated workflow graph: an entry tile plus tiles keyed by id.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    name: Option<String>,
    start_tile: String,
    tiles: HashMap<String, TileDefinition>,
}

impl WorkflowGraph {
    /// Build a graph from tiles. Ids must be present and unique.
    pub fn new(start_tile: impl Into<String>, tiles: Vec<TileDefinition>) -> Result<Self> {
        let start_tile = start_tile.into();
        if start_tile.trim().is_empty() {
            return Err(TileWalkError::InvalidGraph("start_tile is empty".into()));
        }

        let mut map = HashMap::with_capacity(tiles.len());
        for (idx, tile) in tiles.into_iter().enumerate() {
            if tile.id.is_empty() {
                return Err(TileWalkError::InvalidGraph(format!(
                    "tile at index {} has no id",
                    idx
                )));
            }
            if map.contains_key(&tile.id) {
                return Err(TileWalkError::InvalidGraph(format!(
                    "duplicate tile id: {}",
                    tile.id
                )));
            }
            map.insert(tile.id.clone(), tile);
        }

        Ok(Self {
            name: None,
            start_tile,
            tiles: map,
        })
    }

    /// Build a graph from its serialized definition.
    pub fn from_definition(definition: GraphDefinition) -> Result<Self> {
        let GraphDefinition {
            workflow_name,
            start_tile,
            tileids,
            tiles,
        } = definition;

        let tiles = tiles
            .into_iter()
            .enumerate()
            .map(|(idx, mut tile)| {
                if tile.id.is_empty() {
                    if let Some(id) = tileids.get(idx) {
                        tile.id = id.clone();
                    }
                }
                tile
            })
            .collect();

        let mut graph = Self::new(start_tile, tiles)?;
        graph.name = workflow_name;
        Ok(graph)
    }

    /// Parse a graph from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: GraphDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    /// Load a graph from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let graph = Self::from_json(&content)?;
        debug!(path = %path.display(), tiles = graph.len(), "Loaded workflow graph");
        Ok(graph)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn start_tile(&self) -> &str {
        &self.start_tile
    }

    /// Look up a tile by id.
    pub fn get(&self, id: &str) -> Option<&TileDefinition> {
        self.tiles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tiles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tiles sorted by id.
    pub fn tiles(&self) -> Vec<&TileDefinition> {
        let mut tiles: Vec<&TileDefinition> = self.tiles.values().collect();
        tiles.sort_by(|a, b| a.id.cmp(&b.id));
        tiles
    }

    /// References that will end a run with `TileNotFound` if followed.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut dangling = Vec::new();

        if !self.contains(&self.start_tile) {
            dangling.push(DanglingReference {
                tile_id: None,
                field: "start_tile".to_string(),
                target: self.start_tile.clone(),
            });
        }

        for tile in self.tiles.values() {
            for field in REFERENCE_FIELDS {
                let Some(target) = tile.configuration.get(field).and_then(|v| v.as_str()) else {
                    continue;
                };
                if !target.is_empty() && !self.contains(target) {
                    dangling.push(DanglingReference {
                        tile_id: Some(tile.id.clone()),
                        field: field.to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }

        dangling.sort();
        dangling
    }
}
