use std::error::Error;

use hyperstack::{
    config::Config,
    convert::NarrowPolicy,
    element::{ElementBuffer, ElementType, Endianness},
    path::DatasetPath,
    plane::{Plane, PlaneShape},
    reader,
    stack::{Calibration, EagerImageStack},
    store::{MemoryArrayStore, ReadableArrayStore},
    topology::LoadStrategy,
    writer,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn planes<TStore: ?Sized + ReadableArrayStore>(
    stack: hyperstack::stack::ImageStack<'_, TStore>,
) -> Result<Vec<ElementBuffer>, Box<dyn Error>> {
    Ok(stack.into_planes()?.into_iter().map(Plane::into_data).collect())
}

fn uint16_stack(channels: usize, slices: usize, frames: usize) -> EagerImageStack {
    let shape = PlaneShape::new(3, 4);
    let planes = (0..channels * slices * frames)
        .map(|index| {
            let elements = (0..12).map(|i| (index * 100 + i) as u16).collect();
            Plane::new(shape, ElementBuffer::UInt16(elements)).unwrap()
        })
        .collect();
    EagerImageStack::new("stack", shape, planes, channels, slices, frames).unwrap()
}

#[test]
fn round_trip_dataset() -> Result<(), Box<dyn Error>> {
    init_logger();
    let store = MemoryArrayStore::new();
    let path = DatasetPath::new("/group/stack")?;
    let stack = uint16_stack(1, 5, 1).with_calibration(Calibration::new(2.5, 0.5, 0.5));
    writer::write_dataset(&store, &path, &stack)?;

    let read = reader::read_dataset(&store, &path, LoadStrategy::Eager, &Config::default())?;
    assert_eq!(read.dimensions(), (1, 5, 1));
    assert_eq!(read.calibration(), stack.calibration());
    assert_eq!(read.element_type(), Some(ElementType::UINT16));
    assert_eq!(planes(read)?, planes(stack)?);
    Ok(())
}

#[test]
fn round_trip_hyperstack() -> Result<(), Box<dyn Error>> {
    init_logger();
    let store = MemoryArrayStore::new();
    let stack = uint16_stack(2, 3, 4);
    let config = Config::default();
    let paths = writer::write_stack(&store, &DatasetPath::new("/unused")?, &stack, &config)?;
    assert_eq!(paths.len(), 8);

    let (grouping, read) = reader::read_grouped(&store, &config, None, None)?;
    assert_eq!(grouping.frame_count(), 4);
    assert!(grouping.unmatched_names().is_empty());
    assert_eq!(read.dimensions(), (2, 3, 4));
    assert_eq!(planes(read)?, planes(stack)?);
    assert_eq!(store.open_handle_count(), 0);
    Ok(())
}

#[test]
fn round_trip_hyperstack_alias_template() -> Result<(), Box<dyn Error>> {
    let store = MemoryArrayStore::new();
    let mut config = Config::default();
    config.set_template("/f$F/c$C/data".to_string());
    let stack = uint16_stack(3, 1, 2);
    let paths = writer::write_stack(&store, &DatasetPath::new("/unused")?, &stack, &config)?;
    assert_eq!(paths[4].as_str(), "/f1/c1/data");

    let (_, read) = reader::read_grouped(&store, &config, None, None)?;
    assert_eq!(read.dimensions(), (3, 1, 2));
    assert_eq!(planes(read)?, planes(stack)?);
    Ok(())
}

#[test]
fn round_trip_rgb() -> Result<(), Box<dyn Error>> {
    let store = MemoryArrayStore::new();
    let path = DatasetPath::new("/rgb")?;
    let shape = PlaneShape::new(2, 2);
    // 2 slices of red, green, blue planes
    let planes_in: Vec<Plane> = (0..6u8)
        .map(|index| Plane::new(shape, ElementBuffer::UInt8(vec![index * 40; 4])).unwrap())
        .collect();
    let stack = EagerImageStack::new("rgb", shape, planes_in, 3, 2, 1)?.with_rgb(true)?;
    writer::write_dataset(&store, &path, &stack)?;

    let handle = store.open(&path)?;
    assert_eq!(store.shape(&handle)?, [2, 2, 2, 3]);
    assert_eq!(store.element_type(&handle)?, ElementType::UINT8);
    store.close(handle)?;

    let read = reader::read_dataset(&store, &path, LoadStrategy::Virtual, &Config::default())?;
    assert!(read.is_rgb());
    assert!(!read.is_virtual());
    assert_eq!(planes(read)?, planes(stack)?);
    Ok(())
}

#[test]
fn round_trip_big_endian() -> Result<(), Box<dyn Error>> {
    let store = MemoryArrayStore::new().with_endianness(Endianness::Big);
    let path = DatasetPath::new("/f")?;
    let shape = PlaneShape::new(1, 3);
    let plane = Plane::new(shape, ElementBuffer::Float32(vec![0.5, -1.0, 1e6]))?;
    let stack = EagerImageStack::new("f", shape, vec![plane], 1, 1, 1)?;
    writer::write_dataset(&store, &path, &stack)?;
    let read = reader::read_dataset(&store, &path, LoadStrategy::Eager, &Config::default())?;
    assert_eq!(planes(read)?, planes(stack)?);
    Ok(())
}

#[test]
fn read_unsigned_int16_stored_as_signed() -> Result<(), Box<dyn Error>> {
    let store = MemoryArrayStore::new().with_unsigned_as_signed(true);
    let path = DatasetPath::new("/u")?;
    let elements = ElementBuffer::UInt16(vec![65535, 1, 32768]);
    store.insert(&path, &[1, 3], ElementType::UINT16, &elements)?;

    let mut config = Config::default();
    let read = reader::read_dataset(&store, &path, LoadStrategy::Eager, &config)?;
    assert_eq!(planes(read)?, [ElementBuffer::Float32(vec![65535.0, 1.0, 32768.0])]);

    config.set_narrow_policy(NarrowPolicy::ToInt16Truncate);
    let read = reader::read_dataset(&store, &path, LoadStrategy::Eager, &config)?;
    assert_eq!(planes(read)?, [ElementBuffer::Int16(vec![0, 1, 0])]);
    Ok(())
}

#[test]
fn read_narrowed_wide_integers() -> Result<(), Box<dyn Error>> {
    let store = MemoryArrayStore::new();
    let path = DatasetPath::new("/wide")?;
    let elements = ElementBuffer::Int64(vec![70000, -2, 3]);
    store.insert(&path, &[1, 3], ElementType::INT64, &elements)?;

    let mut config = Config::default();
    let read = reader::read_dataset(&store, &path, LoadStrategy::Eager, &config)?;
    assert_eq!(planes(read)?, [ElementBuffer::Float32(vec![70000.0, -2.0, 3.0])]);

    config.set_narrow_policy(NarrowPolicy::ToInt16Truncate);
    let read = reader::read_dataset(&store, &path, LoadStrategy::Eager, &config)?;
    assert_eq!(planes(read)?, [ElementBuffer::Int16(vec![70000_i64 as i16, -2, 3])]);
    Ok(())
}
