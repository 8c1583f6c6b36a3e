//! Recording session tests
//!
//! Capture files must be self-describing and byte-exact with what the
//! device streamed.

use chirp_gateway::audio::{sanitize_remote_id, RecordingSession};
use chirp_gateway::config::DeviceFormat;

const DEVICE_FORMAT: DeviceFormat = DeviceFormat {
    sample_rate: 16_000,
    sample_width: 2,
    channels: 1,
};

#[test]
fn hundred_ms_utterance_produces_expected_container() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        RecordingSession::create(dir.path(), "10.0.0.5:51000", &DEVICE_FORMAT).unwrap();

    // 100 ms of silence at 16 kHz / 16-bit / mono.
    session.append(&[0_u8; 3200]).unwrap();
    let (path, bytes) = session.finalize().unwrap();
    assert_eq!(bytes, 3200);

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.channels, 1);
    assert_eq!(reader.len(), 1600);
}

#[test]
fn frames_are_appended_in_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        RecordingSession::create(dir.path(), "10.0.0.5:51000", &DEVICE_FORMAT).unwrap();

    let first: Vec<u8> = [1_i16, 2, 3].iter().flat_map(|s| s.to_le_bytes()).collect();
    let second: Vec<u8> = [4_i16, 5].iter().flat_map(|s| s.to_le_bytes()).collect();
    session.append(&first).unwrap();
    session.append(&second).unwrap();
    let (path, bytes) = session.finalize().unwrap();
    assert_eq!(bytes, 10);

    let mut reader = hound::WavReader::open(&path).unwrap();
    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples, vec![1, 2, 3, 4, 5]);
}

#[test]
fn trailing_odd_byte_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        RecordingSession::create(dir.path(), "10.0.0.5:51000", &DEVICE_FORMAT).unwrap();

    session.append(&[0x01, 0x00, 0xFF]).unwrap();
    assert_eq!(session.bytes_written(), 2);

    let (path, _) = session.finalize().unwrap();
    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.len(), 1);
}

#[test]
fn capture_file_name_embeds_sanitized_remote() {
    let dir = tempfile::tempdir().unwrap();
    let session = RecordingSession::create(dir.path(), "10.0.0.5:51000", &DEVICE_FORMAT).unwrap();

    let name = session.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("device_10_0_0_5_51000_"));
    assert!(name.ends_with(".wav"));
    assert!(!name.contains(':'));
    session.finalize().unwrap();
}

#[test]
fn unwritable_capture_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("blocker");
    std::fs::write(&not_a_dir, b"occupied").unwrap();

    assert!(RecordingSession::create(&not_a_dir, "10.0.0.5:51000", &DEVICE_FORMAT).is_err());
}

#[test]
fn sanitize_flattens_every_separator() {
    assert_eq!(sanitize_remote_id("10.0.0.5:51000"), "10_0_0_5_51000");
    assert_eq!(sanitize_remote_id("host-name"), "host_name");
    assert_eq!(sanitize_remote_id("plain"), "plain");
}
