use crate::*;

// ============================================================================
//  SCALARS
// ============================================================================

#[test]
fn test_scalars_in_sequence() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.bool(false)?;
    enc.u64(u64::MAX)?;
    enc.f64(-1.0)?;
    enc.unit()?;
    enc.str("initialized")?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    assert!(!dec.bool()?);
    assert_eq!(dec.u64()?, u64::MAX);
    assert_eq!(dec.f64()?, -1.0);
    dec.unit()?;
    assert_eq!(dec.str()?, "initialized");
    assert_eq!(dec.remaining(), 0);
    Ok(())
}

#[test]
fn test_length_header_is_little_endian() -> Result<()> {
    let mut enc = Encoder::new();
    enc.str("abc")?;
    let bytes = enc.into_bytes()?;
    assert_eq!(bytes, vec![0x10, 3, 0, 0, 0, b'a', b'b', b'c']);
    Ok(())
}

// ============================================================================
//  CONTAINERS
// ============================================================================

#[test]
fn test_map_entries_keep_order() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.variant_begin("lat")?;
    enc.f64(52.5)?;
    enc.variant_end()?;
    enc.variant_begin("lon")?;
    enc.f64(13.4)?;
    enc.variant_end()?;
    enc.entry_u64("seq", 7)?;
    enc.variant_begin("logging_enabled")?;
    enc.bool(true)?;
    enc.variant_end()?;
    enc.map_end()?;

    let bytes = enc.into_bytes()?;
    let mut map = Decoder::new(&bytes).map()?;

    let (k, mut v) = map.next()?.unwrap();
    assert_eq!((k, v.f64()?), ("lat", 52.5));
    let (k, mut v) = map.next()?.unwrap();
    assert_eq!((k, v.f64()?), ("lon", 13.4));
    let (k, mut v) = map.next()?.unwrap();
    assert_eq!((k, v.u64()?), ("seq", 7));
    let (k, mut v) = map.next()?.unwrap();
    assert_eq!((k, v.bool()?), ("logging_enabled", true));
    assert!(map.next()?.is_none());
    Ok(())
}

#[test]
fn test_empty_map() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.map_end()?;
    let bytes = enc.into_bytes()?;

    let mut map = Decoder::new(&bytes).map()?;
    assert!(map.next()?.is_none());
    Ok(())
}

#[test]
fn test_result_sides() -> Result<()> {
    let mut enc = Encoder::new();
    enc.result_ok_begin()?;
    enc.bool(true)?;
    enc.result_end()?;
    enc.result_err_begin()?;
    enc.str("boom")?;
    enc.result_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    let mut ok = dec.result()?.expect("first is ok");
    assert!(ok.bool()?);
    let mut err = dec.result()?.expect_err("second is err");
    assert_eq!(err.str()?, "boom");
    Ok(())
}

#[test]
fn test_skip_steps_over_nested_items() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.variant_begin("future_field")?;
    enc.map_begin()?;
    enc.entry_str("nested", "ignored")?;
    enc.map_end()?;
    enc.variant_end()?;
    enc.variant_begin("speed")?;
    enc.f64(3.5)?;
    enc.variant_end()?;
    enc.map_end()?;

    let bytes = enc.into_bytes()?;
    let mut map = Decoder::new(&bytes).map()?;

    let mut speed = None;
    while let Some((key, mut val)) = map.next()? {
        match key {
            "speed" => speed = Some(val.f64()?),
            _ => val.skip()?,
        }
    }
    assert_eq!(speed, Some(3.5));
    Ok(())
}

// ============================================================================
//  STRUCTURAL ERRORS
// ============================================================================

#[test]
fn test_map_rejects_bare_scalar() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    assert_eq!(enc.f64(1.0), Err(Error::InvalidMapEntry));
}

#[test]
fn test_variant_holds_one_item() {
    let mut enc = Encoder::new();
    enc.variant_begin("k").unwrap();
    enc.unit().unwrap();
    assert_eq!(enc.unit(), Err(Error::TooManyItems(Scope::Variant)));
}

#[test]
fn test_variant_requires_payload() {
    let mut enc = Encoder::new();
    enc.variant_begin("k").unwrap();
    assert_eq!(enc.variant_end(), Err(Error::MissingItem(Scope::Variant)));
}

#[test]
fn test_result_requires_payload() {
    let mut enc = Encoder::new();
    enc.result_ok_begin().unwrap();
    assert_eq!(enc.result_end(), Err(Error::MissingItem(Scope::Result)));
}

#[test]
fn test_scope_mismatch_and_underflow() {
    let mut enc = Encoder::new();
    assert_eq!(enc.map_end(), Err(Error::ScopeUnderflow));

    enc.map_begin().unwrap();
    assert_eq!(
        enc.result_end(),
        Err(Error::ScopeMismatch { expected: Scope::Result, actual: Scope::Map })
    );
}

#[test]
fn test_finalize_with_open_scope() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    assert!(matches!(enc.into_bytes(), Err(Error::ScopeStillOpen)));
}

// ============================================================================
//  MALFORMED INPUT
// ============================================================================

#[test]
fn test_truncated_body() {
    let bytes = [0x10, 10, 0, 0, 0, b'x'];
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.str(), Err(Error::UnexpectedEnd));
}

#[test]
fn test_truncated_scalar() {
    let bytes = [0x0C, 0, 0];
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.f64(), Err(Error::UnexpectedEnd));
}

#[test]
fn test_invalid_tag() {
    let bytes = [0xFF];
    let dec = Decoder::new(&bytes);
    assert_eq!(dec.peek_tag(), Err(Error::InvalidTag(0xFF)));
}

#[test]
fn test_invalid_utf8() {
    let bytes = [0x10, 2, 0, 0, 0, 0xC3, 0x28];
    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.str(), Err(Error::InvalidUtf8));
}

#[test]
fn test_wrong_tag_is_reported() {
    let mut enc = Encoder::new();
    enc.u64(1).unwrap();
    let bytes = enc.into_bytes().unwrap();
    let mut dec = Decoder::new(&bytes);
    assert_eq!(
        dec.f64(),
        Err(Error::UnexpectedTag { expected: Tag::F64, found: Tag::U64 })
    );
}

#[test]
fn test_map_with_non_variant_entry() {
    // Map body containing a bare unit instead of a keyed entry.
    let bytes = [0x21, 1, 0, 0, 0, 0x0E];
    let mut map = Decoder::new(&bytes).map().unwrap();
    assert!(map.next().is_err());
}
