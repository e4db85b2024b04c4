// Tests for the final-assembly log

use calmwave_stream::audio::{decode, encode_i16, FinalAssembly};
use tempfile::TempDir;

#[test]
fn assemble_on_empty_log_is_an_error() {
    let assembly = FinalAssembly::new();
    assert!(assembly.is_empty());
    assert!(assembly.assemble(16000).is_err());
}

#[test]
fn assemble_concatenates_chunks_in_log_order() {
    let mut assembly = FinalAssembly::new();

    let parts: [&[i16]; 3] = [&[1, 2, 3], &[4, 5], &[6, 7, 8, 9]];
    for part in parts {
        assembly.append(encode_i16(part, 16000, 1).unwrap());
    }
    assert_eq!(assembly.len(), 3);

    let combined = assembly.assemble(16000).unwrap();
    let decoded = decode(&combined).unwrap();

    assert_eq!(decoded.samples, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    // The artifact is a single mono 16-bit container at the session rate.
    assert_eq!(decoded.channels, 1);
    assert_eq!(decoded.sample_rate, 16000);
}

#[test]
fn clear_resets_the_log_for_a_new_session() {
    let mut assembly = FinalAssembly::new();
    assembly.append(encode_i16(&[1, 2, 3], 16000, 1).unwrap());

    assembly.clear();

    assert!(assembly.is_empty());
    assert!(assembly.assemble(16000).is_err());
}

#[test]
fn save_writes_a_decodable_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("final.wav");

    let mut assembly = FinalAssembly::new();
    assembly.append(encode_i16(&[10; 100], 8000, 1).unwrap());
    assembly.append(encode_i16(&[20; 50], 8000, 1).unwrap());

    assembly.save(&path, 8000).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.samples.len(), 150);
    assert_eq!(decoded.sample_rate, 8000);
}

#[test]
fn undecodable_logged_chunk_fails_the_whole_assemble() {
    let mut assembly = FinalAssembly::new();
    assembly.append(encode_i16(&[1, 2, 3], 16000, 1).unwrap());
    assembly.append(b"corrupted".to_vec());

    assert!(assembly.assemble(16000).is_err());
}
