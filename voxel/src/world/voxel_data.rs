use strum_macros::{Display, EnumIter, FromRepr};

use crate::error::ProtocolError;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Block {
    pub ty: BlockType,
    pub ramp: Option<RampDirection>,
}

impl Block {
    pub const AIR: Block = Block::new(BlockType::Air);

    pub const fn new(ty: BlockType) -> Self {
        Self { ty, ramp: None }
    }

    pub const fn ramp(ty: BlockType, direction: RampDirection) -> Self {
        Self {
            ty,
            ramp: Some(direction),
        }
    }

    pub fn is_air(&self) -> bool {
        self.ty == BlockType::Air
    }

    /// Material code followed by ramp code, 0 meaning no ramp
    pub fn to_wire(self) -> [u8; 2] {
        [self.ty as u8, self.ramp.map_or(0, |direction| direction as u8)]
    }

    pub fn from_wire([ty, ramp]: [u8; 2]) -> Result<Self, ProtocolError> {
        let ty = BlockType::from_repr(ty).ok_or(ProtocolError::InvalidBlockType(ty))?;
        let ramp = match ramp {
            0 => None,
            code => Some(RampDirection::from_repr(code).ok_or(ProtocolError::InvalidRampDirection(code))?),
        };

        Ok(Self { ty, ramp })
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, EnumIter, FromRepr, Display)]
#[repr(u8)]
pub enum BlockType {
    #[default]
    Air = 0,
    Grass = 1,
    Stone = 2,
    Dirt = 3,
    Ore = 4,
}

/// Direction a ramp descends towards, named after the lower neighbor as seen from the higher column.
/// Declaration order is the priority order in which ramp neighbors are tested.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, EnumIter, FromRepr, Display, enum_map::Enum)]
#[repr(u8)]
pub enum RampDirection {
    North = 1,
    South = 2,
    East = 3,
    West = 4,
    NorthEast = 5,
    NorthWest = 6,
    SouthEast = 7,
    SouthWest = 8,
}

impl RampDirection {
    /// (dx, dz) step towards the lower neighbor
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
            Self::NorthEast => (1, -1),
            Self::NorthWest => (-1, -1),
            Self::SouthEast => (1, 1),
            Self::SouthWest => (-1, 1),
        }
    }

    pub const fn is_diagonal(self) -> bool {
        matches!(self, Self::NorthEast | Self::NorthWest | Self::SouthEast | Self::SouthWest)
    }
}
