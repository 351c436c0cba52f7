/// Smallest mapping requested from the system, 16 MiB.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Allocator tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Lower bound for every mapping. Requests larger than this get a mapping
  /// sized to the request instead.
  pub min_chunk_size: usize,
}

impl Config {
  pub const fn new() -> Self {
    Self {
      min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
    }
  }

  pub const fn with_min_chunk_size(
    mut self,
    min_chunk_size: usize,
  ) -> Self {
    self.min_chunk_size = min_chunk_size;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}
