//! Packed vector encoding.
//!
//! Vectors are stored as little-endian packed f32, the form the vector index
//! consumes directly.

pub fn pack_vector(vector: &[f32]) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(vector.len() * 4);
  for value in vector {
    bytes.extend_from_slice(&value.to_le_bytes());
  }
  bytes
}

pub fn unpack_vector(bytes: &[u8]) -> Vec<f32> {
  bytes
    .chunks_exact(4)
    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_round_trip() {
    let vector = vec![0.0, 1.5, -2.25, f32::MIN_POSITIVE];
    assert_eq!(unpack_vector(&pack_vector(&vector)), vector);
  }

  #[test]
  fn test_little_endian_layout() {
    assert_eq!(pack_vector(&[1.0]), 1.0f32.to_le_bytes().to_vec());
    assert_eq!(pack_vector(&[]), Vec::<u8>::new());
  }

  #[test]
  fn test_trailing_bytes_ignored() {
    let mut bytes = pack_vector(&[1.0, 2.0]);
    bytes.push(0xff);
    assert_eq!(unpack_vector(&bytes), vec![1.0, 2.0]);
  }
}
