//! Integration tests: write a store through each adapter and read it back.

use spikeio::container::StructLayout;
use spikeio::prelude::*;
use spikeio::ErrorKind;

use tempfile::TempDir;

const SAMPLING_RATE: f64 = 20000.0;

/// Three units with events, amplitudes, a template and a couple of scalars.
fn sample_store() -> UnitStore {
    let mut store = UnitStore::new(vec![3, 7, 12], SAMPLING_RATE).unwrap();
    store.set_event_sequence(3, vec![0, 15, 19999, 20000, 45001]).unwrap();
    store.set_event_sequence(7, vec![16, 17, 30000]).unwrap();
    store.set_event_sequence(12, vec![5]).unwrap();

    store.set_feature(3, "amplitudes", NdArray::from_f64(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
    store.set_feature(7, "amplitudes", NdArray::from_f64(vec![-1.0, -2.0, -3.0])).unwrap();
    store.set_feature(12, "amplitudes", NdArray::from_f64(vec![9.5])).unwrap();

    let template = |offset: f64| {
        let data = (0..8).map(|i| offset + i as f64).collect();
        PropertyValue::Array(NdArray::new(Shape::d2(2, 4), ElementKind::Float, data).unwrap())
    };
    store.set_property("template", vec![template(0.0), template(10.0), template(20.0)]).unwrap();
    store
        .set_property("firing_rate", vec![PropertyValue::Float(1.5), 2.0.into(), 0.25.into()])
        .unwrap();
    store.set_property("depth", vec![100.0.into(), 220.0.into(), 340.0.into()]).unwrap();
    store
}

fn assert_same_events(a: &dyn SortingSource, b: &dyn SortingSource) {
    assert_eq!(a.unit_ids(), b.unit_ids(), "unit ids differ");
    for unit in a.unit_ids() {
        assert_eq!(
            a.full_event_sequence(unit).unwrap(),
            b.full_event_sequence(unit).unwrap(),
            "events of unit {} differ",
            unit
        );
    }
}

#[test]
fn test_alf_roundtrip() -> Result<()> {
    let tmp = TempDir::new()?;
    let dir = tmp.path().join("alf").join("probe00");
    let store = sample_store();
    AlfSorting::write(&store, &dir, &())?;

    let back = AlfSorting::open_with(&dir, &AlfOptions { sampling_rate: SAMPLING_RATE })?;
    assert_same_events(&store, &back);
    assert_eq!(back.feature(7, "amplitudes")?.data(), &[-1.0, -2.0, -3.0]);
    assert_eq!(back.property(12, "firing_rate")?, PropertyValue::Float(0.25));
    assert_eq!(back.property(7, "depth")?, PropertyValue::Float(220.0));
    assert_eq!(back.property(7, "template")?, store.property(7, "template")?);
    assert_eq!(back.property(12, "cluster_id")?, PropertyValue::Int(12));

    // Non-metric scalars get their own artifact
    assert!(dir.join("clusters.depth.npy").is_file());
    assert!(!dir.join("clusters.firing_rate.npy").is_file());
    Ok(())
}

#[test]
fn test_alf_skips_text_properties() -> Result<()> {
    let tmp = TempDir::new()?;
    let dir = tmp.path().join("probe01");
    let mut store = sample_store();
    store.set_property("label", vec!["good".into(), "mua".into(), "good".into()])?;
    AlfSorting::write(&store, &dir, &())?;

    let back = AlfSorting::open_with(&dir, &AlfOptions { sampling_rate: SAMPLING_RATE })?;
    assert!(!back.has_property("label"));
    assert!(back.has_property("depth"));
    Ok(())
}

#[test]
fn test_alf_rejects_folder_without_probe_marker() -> Result<()> {
    let tmp = TempDir::new()?;
    let dir = tmp.path().join("sorting");
    let err = AlfSorting::write(&sample_store(), &dir, &()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!dir.exists());

    std::fs::create_dir(&dir)?;
    let err = AlfSorting::open(&dir).err().unwrap();
    assert!(matches!(err, Error::InvalidFolderName { .. }));
    Ok(())
}

#[test]
fn test_hdsort_roundtrip_both_layouts() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = sample_store();
    for layout in [StructLayout::Inline, StructLayout::Indirected] {
        let path = tmp.path().join(format!("{:?}.spk", layout));
        let opts = HdsortWriteOptions { layout, ..Default::default() };
        HdsortSorting::write(&store, &path, &opts)?;

        let back = HdsortSorting::open(&path)?;
        assert_eq!(back.layout(), layout);
        assert_eq!(back.sampling_rate(), SAMPLING_RATE);
        assert_same_events(&store, &back);
        assert_eq!(back.property(3, "template")?, store.property(3, "template")?);
        assert_eq!(back.property(3, "template_frames_cut_before")?, PropertyValue::Int(1));
        assert_eq!(back.feature(3, "amplitudes")?.data(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }
    Ok(())
}

#[test]
fn test_hdsort_layouts_read_identically() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = sample_store();
    let inline = tmp.path().join("inline.spk");
    let indirected = tmp.path().join("indirected.spk");
    HdsortSorting::write(&store, &inline, &HdsortWriteOptions { layout: StructLayout::Inline, ..Default::default() })?;
    HdsortSorting::write(
        &store,
        &indirected,
        &HdsortWriteOptions { layout: StructLayout::Indirected, ..Default::default() },
    )?;

    let a = HdsortSorting::open(&inline)?;
    let b = HdsortSorting::open(&indirected)?;
    assert_same_events(&a, &b);
    assert_eq!(a.property_names(), b.property_names());
    for unit in a.unit_ids() {
        assert_eq!(a.unit_feature_names(unit)?, b.unit_feature_names(unit)?);
        for name in a.property_names() {
            assert_eq!(a.property(unit, &name)?, b.property(unit, &name)?);
        }
        for name in a.unit_feature_names(unit)? {
            assert_eq!(a.feature(unit, &name)?, b.feature(unit, &name)?);
        }
    }
    Ok(())
}

#[test]
fn test_yass_roundtrip() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = sample_store();
    YassSorting::write(&store, tmp.path(), &())?;

    let back = YassSorting::open(tmp.path())?;
    assert_eq!(back.sampling_rate(), SAMPLING_RATE);
    assert_same_events(&store, &back);
    for unit in store.unit_ids() {
        assert_eq!(back.property(unit, "template")?, store.property(unit, "template")?);
    }
    Ok(())
}

#[test]
fn test_windows_after_roundtrip() -> Result<()> {
    let tmp = TempDir::new()?;
    let dir = tmp.path().join("probe00");
    AlfSorting::write(&sample_store(), &dir, &())?;
    let back = AlfSorting::open_with(&dir, &AlfOptions { sampling_rate: SAMPLING_RATE })?;

    assert_eq!(back.event_sequence(3, FrameWindow::new(Some(15), None))?, vec![15, 19999, 20000, 45001]);
    assert_eq!(back.event_sequence(3, FrameWindow::between(-100, 20000))?, vec![0, 15, 19999]);
    assert_eq!(back.event_sequence(3, FrameWindow::between(-100, 100000))?.len(), 5);

    let err = back.event_sequence(3, FrameWindow::between(50000, 60000)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    let err = back.event_sequence(4, FrameWindow::ALL).unwrap_err();
    assert!(matches!(err, Error::UnknownUnit { unit: 4, ref valid } if valid == &vec![3, 7, 12]));
    Ok(())
}
