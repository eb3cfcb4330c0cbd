//! Static block catalog: names plus the drop/replace rules applied when digging.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mdbeta_core::{BlockId, ItemId, BLOCK_AIR};
use serde::Deserialize;
use tracing::warn;

/// ID for stone.
pub const BLOCK_STONE: BlockId = 1;
/// ID for grass.
pub const BLOCK_GRASS: BlockId = 2;
/// ID for dirt.
pub const BLOCK_DIRT: BlockId = 3;
/// ID for cobblestone.
pub const BLOCK_COBBLESTONE: BlockId = 4;
/// ID for saplings.
pub const BLOCK_SAPLING: BlockId = 6;
/// ID for bedrock.
pub const BLOCK_BEDROCK: BlockId = 7;
/// ID for logs.
pub const BLOCK_LOG: BlockId = 17;
/// ID for leaves.
pub const BLOCK_LEAVES: BlockId = 18;
/// ID for the workbench.
pub const BLOCK_WORKBENCH: BlockId = 58;

const BLOCK_NAMES: &[&str] = &[
    "air",
    "stone",
    "grass",
    "dirt",
    "cobblestone",
    "wood",
    "sapling",
    "bedrock",
    "water",
    "spring",
    "lava",
    "lava-spring",
    "sand",
    "gravel",
    "gold-ore",
    "iron-ore",
    "coal-ore",
    "log",
    "leaves",
    "sponge",
    "glass",
    "lapis-lazuli-ore",
    "lapis-lazuli",
    "dispenser",
    "sandstone",
    "note-block",
    "aqua-cloth",
    "cyan-cloth",
    "blue-cloth",
    "purple-cloth",
    "indigo-cloth",
    "violet-cloth",
    "magenta-cloth",
    "pink-cloth",
    "black-cloth",
    "grey-cloth",
    "wool",
    "flower",
    "rose",
    "brown-mushroom",
    "red-mushroom",
    "gold",
    "iron",
    "double-step",
    "step",
    "brick",
    "tnt",
    "bookshelf",
    "mossy-cobblestone",
    "obsidian",
    "torch",
    "fire",
    "mob-spawner",
    "wooden-stairs",
    "chest",
    "redstone-wire",
    "diamond-ore",
    "diamond",
    "workbench",
    "crops",
    "soil",
    "furnace",
    "burning-furnace",
    "signpost",
    "wooden-door",
    "ladder",
    "tracks",
    "stone-stairs",
    "wall-sign",
    "lever",
    "stone-plate",
    "iron-door",
    "wooden-plate",
    "redstone-ore",
    "glowing-redstone-ore",
    "redstone-torch-off",
    "redstone-torch",
    "stone-button",
    "snow",
    "ice",
    "snow-block",
    "cactus",
    "clay",
    "sugar-cane",
    "jukebox",
    "fence",
    "pumpkin",
    "brimstone",
    "slow-sand",
    "lightstone",
    "portal",
    "jack-o-lantern",
    "cake",
];

/// Blocks that drop something other than themselves (0 = nothing).
const DROPS: &[(BlockId, ItemId)] = &[
    (1, 4),    // stone -> cobblestone
    (2, 3),    // grass -> dirt
    (18, 6),   // leaves -> sapling
    (20, 0),   // glass
    (60, 3),   // soil -> dirt
    (62, 61),  // burning furnace -> furnace
    (78, 0),   // snow
    (79, 0),   // ice
    (13, 318), // gravel -> flint
    (16, 263), // coal ore -> coal
    (56, 264), // diamond ore -> diamond
    (63, 323), // signpost -> sign
    (64, 324), // wooden door -> door item
    (68, 323), // wall sign -> sign
    (71, 330), // iron door -> door item
    (73, 331), // redstone ore -> redstone
    (74, 331),
    (82, 337), // clay -> clay balls
    (83, 338), // sugar cane -> reed item
    (89, 348), // lightstone -> lightstone dust
];

/// Blocks that leave something other than air behind.
const REPLACES: &[(BlockId, BlockId)] = &[
    (79, 8), // ice -> water
];

/// Properties of a single block type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockInfo {
    /// Catalog slot.
    pub id: BlockId,
    /// Common name.
    pub name: String,
    /// Item dropped when dug; 0 drops nothing.
    pub drop: ItemId,
    /// Block left in place when dug.
    #[serde(default)]
    pub replace: BlockId,
}

/// Lookup table of block properties indexed by id.
#[derive(Debug, Clone)]
pub struct BlockCatalog {
    blocks: Vec<Option<BlockInfo>>,
    by_name: HashMap<String, BlockId>,
}

impl BlockCatalog {
    /// Build a catalog from explicit block descriptions.
    pub fn new(infos: Vec<BlockInfo>) -> Self {
        let mut blocks: Vec<Option<BlockInfo>> = vec![None; 256];
        let mut by_name = HashMap::new();
        for info in infos {
            by_name.insert(info.name.clone(), info.id);
            let slot = info.id as usize;
            blocks[slot] = Some(info);
        }
        Self { blocks, by_name }
    }

    /// The stock beta block table.
    pub fn beta() -> Self {
        let infos = BLOCK_NAMES
            .iter()
            .enumerate()
            .map(|(slot, name)| {
                let id = slot as BlockId;
                let drop = DROPS
                    .iter()
                    .find(|(block, _)| *block == id)
                    .map(|(_, drop)| *drop)
                    .unwrap_or(ItemId::from(id));
                let replace = REPLACES
                    .iter()
                    .find(|(block, _)| *block == id)
                    .map(|(_, replace)| *replace)
                    .unwrap_or(BLOCK_AIR);
                BlockInfo {
                    id,
                    name: (*name).to_string(),
                    drop,
                    replace,
                }
            })
            .collect();
        Self::new(infos)
    }

    /// Parse a JSON array of [`BlockInfo`] records.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let infos: Vec<BlockInfo> =
            serde_json::from_str(json).context("Failed to parse block catalog")?;
        Ok(Self::new(infos))
    }

    /// Load a catalog from disk, falling back to [`BlockCatalog::beta`] on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(catalog) => catalog,
                Err(err) => {
                    warn!("Failed to parse {}: {err:#}. Using defaults", path.display());
                    Self::beta()
                }
            },
            Err(err) => {
                warn!("Failed to read {}: {err}. Using defaults", path.display());
                Self::beta()
            }
        }
    }

    /// Properties for a block id, if the catalog knows it.
    pub fn info(&self, id: BlockId) -> Option<&BlockInfo> {
        self.blocks[id as usize].as_ref()
    }

    /// Look up a block id by name.
    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// Block left behind when `id` is dug. Unknown blocks leave air.
    pub fn replace_of(&self, id: BlockId) -> BlockId {
        self.info(id).map(|info| info.replace).unwrap_or(BLOCK_AIR)
    }

    /// Item dropped when `id` is dug, or `None` when it drops nothing.
    pub fn drop_of(&self, id: BlockId) -> Option<ItemId> {
        self.info(id)
            .map(|info| info.drop)
            .filter(|drop| *drop != 0)
    }
}

impl Default for BlockCatalog {
    fn default() -> Self {
        Self::beta()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stone_drops_cobblestone_and_leaves_air() {
        let catalog = BlockCatalog::beta();
        assert_eq!(catalog.drop_of(BLOCK_STONE), Some(ItemId::from(BLOCK_COBBLESTONE)));
        assert_eq!(catalog.replace_of(BLOCK_STONE), BLOCK_AIR);
    }

    #[test]
    fn blocks_drop_themselves_by_default() {
        let catalog = BlockCatalog::beta();
        assert_eq!(catalog.drop_of(BLOCK_DIRT), Some(ItemId::from(BLOCK_DIRT)));
        assert_eq!(catalog.drop_of(BLOCK_LOG), Some(ItemId::from(BLOCK_LOG)));
    }

    #[test]
    fn air_and_glass_drop_nothing() {
        let catalog = BlockCatalog::beta();
        assert_eq!(catalog.drop_of(BLOCK_AIR), None);
        assert_eq!(catalog.drop_of(20), None);
    }

    #[test]
    fn ice_melts_into_water() {
        let catalog = BlockCatalog::beta();
        assert_eq!(catalog.replace_of(79), 8);
        assert_eq!(catalog.drop_of(79), None);
    }

    #[test]
    fn item_drops_use_item_ids() {
        let catalog = BlockCatalog::beta();
        assert_eq!(catalog.drop_of(56), Some(264));
    }

    #[test]
    fn names_resolve_to_slots() {
        let catalog = BlockCatalog::beta();
        assert_eq!(catalog.id_by_name("workbench"), Some(BLOCK_WORKBENCH));
        assert_eq!(catalog.id_by_name("sapling"), Some(BLOCK_SAPLING));
        assert_eq!(catalog.id_by_name("cake"), Some(92));
    }

    #[test]
    fn unknown_blocks_leave_air_and_drop_nothing() {
        let catalog = BlockCatalog::beta();
        assert!(catalog.info(200).is_none());
        assert_eq!(catalog.replace_of(200), BLOCK_AIR);
        assert_eq!(catalog.drop_of(200), None);
    }

    #[test]
    fn catalog_loads_from_json() {
        let catalog = BlockCatalog::from_json_str(
            r#"[{"id":1,"name":"stone","drop":4},{"id":79,"name":"ice","drop":0,"replace":8}]"#,
        )
        .expect("catalog parses");
        assert_eq!(catalog.drop_of(1), Some(4));
        assert_eq!(catalog.replace_of(79), 8);
        assert!(catalog.info(2).is_none());
    }

    #[test]
    fn missing_catalog_file_falls_back_to_beta() {
        let catalog = BlockCatalog::load_from_path(Path::new("/nonexistent/blocks.json"));
        assert_eq!(catalog.id_by_name("stone"), Some(BLOCK_STONE));
    }
}
