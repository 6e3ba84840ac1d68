//! SQLite vector extension integration
//!
//! Embeddings are stored as little-endian `f32` blobs and compared with
//! sqlite-vec's `vec_distance_cosine`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards.
///
/// Must run before the first connection is created; repeated calls are no-ops.
pub fn init_vec_extension() {
    INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// `None` if the blob length is not a multiple of four.
pub fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
