use scanline::error::Error;
use scanline::units::{Dimensions, SizeUnit, to_pixels};

#[test]
fn physical_inch_at_300_ppi() {
    assert_eq!(to_pixels(2.54, SizeUnit::Physical, 300.0).unwrap(), 300.0);
    assert_eq!(to_pixels(1.0, SizeUnit::Physical, 300.0).unwrap(), 118.0);
}

#[test]
fn pixels_pass_through() {
    for v in [0.0, 1.0, 299.5, 1024.0] {
        let once = to_pixels(v, SizeUnit::Pixel, 96.0).unwrap();
        let twice = to_pixels(once, SizeUnit::Pixel, 96.0).unwrap();
        assert_eq!(once, v);
        assert_eq!(twice, v);
    }
    // Resolution is irrelevant for pixels, even when nonsensical.
    assert_eq!(to_pixels(42.0, SizeUnit::Pixel, 0.0).unwrap(), 42.0);
}

#[test]
fn non_positive_resolution_is_invalid_for_physical() {
    for r in [0.0, -300.0, f64::NAN] {
        let err = to_pixels(1.0, SizeUnit::Physical, r).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}

#[test]
fn negative_values_are_invalid() {
    assert!(matches!(
        to_pixels(-1.0, SizeUnit::Pixel, 300.0),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn dimensions_resolve_to_whole_pixels() {
    assert_eq!(Dimensions::default().resolve().unwrap(), (300, 300));

    let zero = Dimensions {
        width: 0.0,
        ..Dimensions::default()
    };
    assert!(matches!(zero.resolve(), Err(Error::InvalidConfig(_))));
}

#[test]
fn unit_names_parse() {
    assert_eq!("px".parse::<SizeUnit>().unwrap(), SizeUnit::Pixel);
    assert_eq!("CM".parse::<SizeUnit>().unwrap(), SizeUnit::Physical);
    assert!("furlong".parse::<SizeUnit>().is_err());
}
