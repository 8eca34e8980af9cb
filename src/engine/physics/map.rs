use glam::Vec2;

/// Surface kind of one map block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GroundType {
    #[default]
    Air,
    Water,
    Road,
    Pavement,
    Field,
    Building,
}

impl GroundType {
    /// Whether pedestrians and cars can move across this block
    pub fn is_walkable(self) -> bool {
        matches!(self, GroundType::Road | GroundType::Pavement | GroundType::Field)
    }

    pub fn is_solid(self) -> bool {
        self == GroundType::Building
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapBlockInfo {
    pub ground_type: GroundType,
}

impl MapBlockInfo {
    pub fn new(ground_type: GroundType) -> Self {
        Self { ground_type }
    }
}

/// Size of the map in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapDimensions {
    pub width: i32,
    pub depth: i32,
    pub layers: i32,
}

/// Terrain collaborator consulted by the physics world
///
/// Planar positions are world (x, z).
pub trait MapData: Send + Sync {
    fn dimensions(&self) -> MapDimensions;

    /// World length of one block edge
    fn block_length(&self) -> f32;

    /// Block at column (x, z) and `layer`; out of range coordinates are clamped
    fn block_info(&self, x: i32, layer: i32, z: i32) -> MapBlockInfo;

    /// Terrain height; with `exclude_water` the water surface is ignored
    fn height_at_position(&self, position: Vec2, exclude_water: bool) -> f32;

    /// Water surface height, `None` where there is no water
    fn water_level_at_position(&self, position: Vec2) -> Option<f32>;
}

/// Column coordinates of the block containing `position`
pub fn block_coords(map: &dyn MapData, position: Vec2) -> (i32, i32) {
    let length = map.block_length();
    (
        (position.x / length).floor() as i32,
        (position.y / length).floor() as i32,
    )
}

/// Map layer an object at `height` occupies, clamped to the map
pub fn layer_at_height(map: &dyn MapData, height: f32) -> i32 {
    let layer = (height / map.block_length() + 0.5).floor() as i32;
    layer.clamp(0, (map.dimensions().layers - 1).max(0))
}

/// Columns that need a solid collider
///
/// A column qualifies when any of its layers holds a building block that
/// borders walkable ground. Blocks enclosed by non-walkable neighbours on all
/// four sides can never be reached and are skipped.
pub fn solid_columns(map: &dyn MapData) -> Vec<(i32, i32)> {
    let dims = map.dimensions();
    let mut columns = Vec::new();

    for z in 0..dims.depth {
        for x in 0..dims.width {
            let exposed = (0..dims.layers).any(|layer| {
                if !map.block_info(x, layer, z).ground_type.is_solid() {
                    return false;
                }
                let neighbours = [(x + 1, z), (x - 1, z), (x, z - 1), (x, z + 1)];
                neighbours
                    .iter()
                    .any(|&(nx, nz)| map.block_info(nx, layer, nz).ground_type.is_walkable())
            });
            if exposed {
                columns.push((x, z));
            }
        }
    }
    columns
}

/// Simple in-memory block map
#[derive(Debug, Clone)]
pub struct GridMap {
    dimensions: MapDimensions,
    block_length: f32,
    /// Indexed by [layer][z][x]
    blocks: Vec<MapBlockInfo>,
    /// Ground height per column, indexed by [z][x]
    heights: Vec<f32>,
    /// Water surface per column, indexed by [z][x]
    water: Vec<Option<f32>>,
}

impl GridMap {
    /// Create a flat map of air blocks at height zero
    pub fn new(width: i32, depth: i32, layers: i32, block_length: f32) -> Self {
        debug_assert!(width > 0 && depth > 0 && layers > 0 && block_length > 0.0);
        let columns = (width * depth) as usize;
        Self {
            dimensions: MapDimensions {
                width,
                depth,
                layers,
            },
            block_length,
            blocks: vec![MapBlockInfo::default(); columns * layers as usize],
            heights: vec![0.0; columns],
            water: vec![None; columns],
        }
    }

    /// Fill every column's bottom layer with `ground_type`
    pub fn with_ground(mut self, ground_type: GroundType) -> Self {
        for z in 0..self.dimensions.depth {
            for x in 0..self.dimensions.width {
                self.set_block(x, 0, z, ground_type);
            }
        }
        self
    }

    pub fn set_block(&mut self, x: i32, layer: i32, z: i32, ground_type: GroundType) {
        if let Some(index) = self.block_index(x, layer, z) {
            self.blocks[index] = MapBlockInfo::new(ground_type);
        }
    }

    pub fn set_height(&mut self, x: i32, z: i32, height: f32) {
        if let Some(index) = self.column_index(x, z) {
            self.heights[index] = height;
        }
    }

    pub fn set_water_level(&mut self, x: i32, z: i32, level: Option<f32>) {
        if let Some(index) = self.column_index(x, z) {
            self.water[index] = level;
        }
    }

    /// Stack building blocks from the bottom up to `height_in_layers`
    pub fn add_building(&mut self, x: i32, z: i32, height_in_layers: i32) {
        for layer in 0..height_in_layers.min(self.dimensions.layers) {
            self.set_block(x, layer, z, GroundType::Building);
        }
    }

    fn column_index(&self, x: i32, z: i32) -> Option<usize> {
        let dims = self.dimensions;
        if x < 0 || z < 0 || x >= dims.width || z >= dims.depth {
            return None;
        }
        Some((z * dims.width + x) as usize)
    }

    fn block_index(&self, x: i32, layer: i32, z: i32) -> Option<usize> {
        if layer < 0 || layer >= self.dimensions.layers {
            return None;
        }
        let column = self.column_index(x, z)?;
        Some(layer as usize * (self.dimensions.width * self.dimensions.depth) as usize + column)
    }

    fn clamped_column(&self, position: Vec2) -> usize {
        let dims = self.dimensions;
        let x = ((position.x / self.block_length).floor() as i32).clamp(0, dims.width - 1);
        let z = ((position.y / self.block_length).floor() as i32).clamp(0, dims.depth - 1);
        (z * dims.width + x) as usize
    }
}

impl MapData for GridMap {
    fn dimensions(&self) -> MapDimensions {
        self.dimensions
    }

    fn block_length(&self) -> f32 {
        self.block_length
    }

    fn block_info(&self, x: i32, layer: i32, z: i32) -> MapBlockInfo {
        let dims = self.dimensions;
        let index = self.block_index(
            x.clamp(0, dims.width - 1),
            layer.clamp(0, dims.layers - 1),
            z.clamp(0, dims.depth - 1),
        );
        index.map(|i| self.blocks[i]).unwrap_or_default()
    }

    fn height_at_position(&self, position: Vec2, exclude_water: bool) -> f32 {
        let column = self.clamped_column(position);
        let ground = self.heights[column];
        match self.water[column] {
            Some(level) if !exclude_water => ground.max(level),
            _ => ground,
        }
    }

    fn water_level_at_position(&self, position: Vec2) -> Option<f32> {
        self.water[self.clamped_column(position)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_info_clamps() {
        let mut map = GridMap::new(4, 4, 2, 1.0);
        map.set_block(3, 1, 3, GroundType::Building);

        assert_eq!(map.block_info(10, 5, 10).ground_type, GroundType::Building);
        assert_eq!(map.block_info(-1, -1, -1).ground_type, GroundType::Air);
    }

    #[test]
    fn test_height_and_water() {
        let mut map = GridMap::new(4, 4, 2, 2.0);
        map.set_height(1, 0, 0.5);
        map.set_water_level(1, 0, Some(0.8));

        let inside = Vec2::new(2.5, 1.0);
        assert_eq!(map.height_at_position(inside, true), 0.5);
        assert_eq!(map.height_at_position(inside, false), 0.8);
        assert_eq!(map.water_level_at_position(inside), Some(0.8));
        assert_eq!(map.water_level_at_position(Vec2::ZERO), None);
    }

    #[test]
    fn test_layer_at_height_rounds_and_clamps() {
        let map = GridMap::new(2, 2, 3, 1.0);
        assert_eq!(layer_at_height(&map, 0.4), 0);
        assert_eq!(layer_at_height(&map, 0.6), 1);
        assert_eq!(layer_at_height(&map, -3.0), 0);
        assert_eq!(layer_at_height(&map, 10.0), 2);
    }

    #[test]
    fn test_solid_columns_skip_inner_blocks() {
        // 5x5 road with a 3x3 building block in the middle
        let mut map = GridMap::new(5, 5, 2, 1.0).with_ground(GroundType::Road);
        for z in 1..4 {
            for x in 1..4 {
                map.add_building(x, z, 2);
            }
        }

        let columns = solid_columns(&map);
        assert_eq!(columns.len(), 8);
        assert!(!columns.contains(&(2, 2)));
        assert!(columns.contains(&(1, 1)));
    }

    #[test]
    fn test_block_coords() {
        let map = GridMap::new(8, 8, 1, 2.0);
        assert_eq!(block_coords(&map, Vec2::new(3.9, 4.1)), (1, 2));
    }
}
