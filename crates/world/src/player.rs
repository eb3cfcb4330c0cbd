//! Player state: location, inventory containers and persisted snapshot.

use mdbeta_core::{EntityId, ItemStack};
use serde::{Deserialize, Serialize};

/// Number of slots in the main inventory (hotbar included).
pub const HOLDABLES_SIZE: usize = 36;
/// Number of slots in the personal crafting grid.
pub const CRAFTING_SIZE: usize = 4;
/// Number of armor slots.
pub const ARMOR_SIZE: usize = 4;
/// Largest stack a slot holds.
pub const MAX_STACK: u8 = 64;

/// Player position and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// World X.
    pub x: f64,
    /// World Y (feet).
    pub y: f64,
    /// World Z.
    pub z: f64,
    /// Eye height (feet + ~1.62).
    pub stance: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Whether the client reports standing on a block.
    pub on_ground: bool,
}

impl Location {
    /// Location standing at the given coordinates, looking straight ahead.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            stance: y + 1.62,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
        }
    }

    /// Position in 1/32-block units, as used for entity positions.
    pub fn fixed(&self) -> (i32, i32, i32) {
        (
            (self.x * 32.0).floor() as i32,
            (self.y * 32.0).floor() as i32,
            (self.z * 32.0).floor() as i32,
        )
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::at(0.0, 0.0, 0.0)
    }
}

/// Inventory container addressed by the inventory-update sub-discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Main inventory.
    Holdables,
    /// Personal crafting grid.
    Crafting,
    /// Worn armor.
    Armor,
}

impl ContainerKind {
    /// All containers in snapshot order.
    pub const ALL: [ContainerKind; 3] = [
        ContainerKind::Holdables,
        ContainerKind::Crafting,
        ContainerKind::Armor,
    ];

    /// Wire discriminant.
    pub fn wire_id(self) -> i32 {
        match self {
            ContainerKind::Holdables => -1,
            ContainerKind::Crafting => -2,
            ContainerKind::Armor => -3,
        }
    }

    /// Wire discriminant to container; other values are not containers.
    pub fn from_wire(id: i32) -> Option<Self> {
        match id {
            -1 => Some(ContainerKind::Holdables),
            -2 => Some(ContainerKind::Crafting),
            -3 => Some(ContainerKind::Armor),
            _ => None,
        }
    }

    /// Slot count.
    pub fn size(self) -> usize {
        match self {
            ContainerKind::Holdables => HOLDABLES_SIZE,
            ContainerKind::Crafting => CRAFTING_SIZE,
            ContainerKind::Armor => ARMOR_SIZE,
        }
    }
}

/// Fixed-size run of inventory slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    slots: Vec<Option<ItemStack>>,
}

impl Container {
    /// Create an empty container with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the container has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get the stack in a slot.
    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Replace every slot with `slots`. Extra entries are dropped; missing ones become empty.
    pub fn replace(&mut self, slots: &[Option<ItemStack>]) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            *slot = slots.get(index).copied().flatten();
        }
    }

    /// Store a stack, topping up matching stacks before using empty slots.
    ///
    /// Returns the number of items that did not fit.
    pub fn add(&mut self, stack: ItemStack) -> u8 {
        let mut remaining = stack.count;
        for held in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if held.id == stack.id && held.damage == stack.damage && held.count < MAX_STACK {
                let moved = remaining.min(MAX_STACK - held.count);
                held.count += moved;
                remaining -= moved;
            }
        }
        for slot in self.slots.iter_mut().filter(|slot| slot.is_none()) {
            if remaining == 0 {
                break;
            }
            let moved = remaining.min(MAX_STACK);
            *slot = Some(ItemStack {
                count: moved,
                ..stack
            });
            remaining -= moved;
        }
        remaining
    }

    /// Slot contents in order.
    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }
}

/// The three per-player containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Main inventory.
    pub holdables: Container,
    /// Personal crafting grid.
    pub crafting: Container,
    /// Worn armor.
    pub armor: Container,
}

impl Inventory {
    /// Container selected by `kind`.
    pub fn container(&self, kind: ContainerKind) -> &Container {
        match kind {
            ContainerKind::Holdables => &self.holdables,
            ContainerKind::Crafting => &self.crafting,
            ContainerKind::Armor => &self.armor,
        }
    }

    /// Mutable container selected by `kind`.
    pub fn container_mut(&mut self, kind: ContainerKind) -> &mut Container {
        match kind {
            ContainerKind::Holdables => &mut self.holdables,
            ContainerKind::Crafting => &mut self.crafting,
            ContainerKind::Armor => &mut self.armor,
        }
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            holdables: Container::new(HOLDABLES_SIZE),
            crafting: Container::new(CRAFTING_SIZE),
            armor: Container::new(ARMOR_SIZE),
        }
    }
}

/// Persisted player record handed to and from the world store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerData {
    /// Last known location; `None` for a new player.
    pub location: Option<Location>,
    /// Inventory contents.
    pub inventory: Inventory,
    /// Selected hotbar slot.
    pub equipped: u16,
}

/// Live player owned by an authenticated session.
#[derive(Debug, Clone)]
pub struct Player {
    /// Entity id reserved during the handshake.
    pub entity_id: EntityId,
    /// Login name.
    pub username: String,
    /// Current location.
    pub location: Location,
    /// Inventory containers.
    pub inventory: Inventory,
    /// Selected hotbar slot; not validated against contents.
    pub equipped: u16,
}

impl Player {
    /// Hydrate a player from persisted data, using `fallback` when no location was stored.
    pub fn hydrate(
        entity_id: EntityId,
        username: impl Into<String>,
        data: Option<PlayerData>,
        fallback: Location,
    ) -> Self {
        let data = data.unwrap_or_default();
        Self {
            entity_id,
            username: username.into(),
            location: data.location.unwrap_or(fallback),
            inventory: data.inventory,
            equipped: data.equipped,
        }
    }

    /// Snapshot for persistence.
    pub fn to_data(&self) -> PlayerData {
        PlayerData {
            location: Some(self.location),
            inventory: self.inventory.clone(),
            equipped: self.equipped,
        }
    }
}
