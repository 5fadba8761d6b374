use crate::{ByteBuffer, Error, RecordController};
use test_log::test;

#[test]
fn test_buffer_roundtrip() {
    let mut buf = ByteBuffer::new();
    buf.put(0x1234_5678_u32);
    buf.put(-5_i8);
    buf.put(2.5_f32);
    buf.put_str("chr1");
    buf.put(u64::MAX);

    let mut cur = buf.cursor();
    assert_eq!(cur.get::<u32>().unwrap(), 0x1234_5678);
    assert_eq!(cur.get::<i8>().unwrap(), -5);
    assert_eq!(cur.get::<f32>().unwrap(), 2.5);
    assert_eq!(cur.get_string().unwrap(), "chr1");
    assert_eq!(cur.get::<u64>().unwrap(), u64::MAX);
    assert!(cur.at_end());
}

#[test]
fn test_buffer_little_endian() {
    let mut buf = ByteBuffer::new();
    buf.put(0x0102_0304_u32);
    assert_eq!(buf.as_slice(), &[0x04, 0x03, 0x02, 0x01]);
}

#[test]
fn test_buffer_bounds() {
    let mut buf = ByteBuffer::new();
    buf.put(7_u16);
    assert!(matches!(
        buf.get::<u32>(0),
        Err(Error::BufferBounds(_))
    ));
    let mut cur = buf.cursor();
    cur.get::<u16>().unwrap();
    assert!(matches!(cur.get::<u8>(), Err(Error::BufferBounds(_))));
}

#[test]
fn test_buffer_prefixed_bytes() {
    let mut buf = ByteBuffer::new();
    buf.put_prefixed_bytes(b"ACGT");
    assert_eq!(buf.len(), 8);
    let mut cur = buf.cursor();
    assert_eq!(cur.get_prefixed_bytes().unwrap(), b"ACGT");
}

#[test]
fn test_buffer_clear_keeps_capacity() {
    let mut buf = ByteBuffer::with_capacity(64);
    buf.put_bytes(&[0u8; 48]);
    let cap = buf.capacity();
    buf.clear();
    assert_eq!(buf.len(), 0);
    assert_eq!(buf.capacity(), cap);
}

#[test]
fn test_record_controller_width_code() {
    let mut ctrl = RecordController::new();
    ctrl.set(RecordController::GT_AVAILABLE, true);
    ctrl.set(RecordController::BIALLELIC, true);
    ctrl.set_width_code(2);
    assert!(ctrl.test(RecordController::GT_AVAILABLE));
    assert!(!ctrl.test(RecordController::ANY_MISSING));
    assert_eq!(ctrl.width_code(), 2);

    let back = RecordController::from_bits(ctrl.bits());
    assert_eq!(back, ctrl);
    assert_eq!(back.width_code(), 2);
}
