use blobseq::graph::compact;
use blobseq::graph::{expect_type, FieldKind, GraphError, LoadContext, ObjectGraph, ObjectId, Reflect, TypeDescriptor, Value};
use blobseq::{ContainerOptions, Layout, SequenceReader, SequenceWriter};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;

fn packed(layout: Layout, count: usize, size: usize) -> Vec<u8> {
    let mut w = SequenceWriter::new(Cursor::new(Vec::new()), ContainerOptions::new(layout));
    for i in 0..count {
        if layout.is_named() {
            w.add_named(&format!("entry_{i}"), vec![i as u8; size]).unwrap();
        } else {
            w.add(vec![i as u8; size]).unwrap();
        }
    }
    w.flush(false).unwrap();
    w.into_inner().unwrap().into_inner()
}

fn bench_write(c: &mut Criterion) {
    c.bench_function("write_sequential_1000x1kb", |b| {
        b.iter(|| black_box(packed(Layout::Sequential, 1000, 1024)))
    });
    c.bench_function("write_indexed_named_1000x1kb", |b| {
        b.iter(|| black_box(packed(Layout::IndexedNamed, 1000, 1024)))
    });
}

fn bench_read(c: &mut Criterion) {
    let sequential = packed(Layout::Sequential, 1000, 1024);
    let indexed = packed(Layout::Indexed, 1000, 1024);

    c.bench_function("read_all_sequential_1000x1kb", |b| {
        b.iter(|| {
            let mut r = SequenceReader::open(Cursor::new(black_box(&sequential[..])), ContainerOptions::default()).unwrap();
            r.read_all(true).unwrap()
        })
    });

    c.bench_function("read_one_indexed_of_1000", |b| {
        b.iter(|| {
            let mut r = SequenceReader::open(Cursor::new(black_box(&indexed[..])), ContainerOptions::new(Layout::Indexed)).unwrap();
            r.read_one(500, true).unwrap()
        })
    });
}

struct Sample {
    id:     i64,
    label:  String,
    values: Vec<f64>,
}

impl Reflect for Sample {
    const TYPE_NAME: &'static str = "bench::Sample";

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(Self::TYPE_NAME)
            .field("id", FieldKind::of::<i64>())
            .field("label", FieldKind::of::<String>())
            .field("values", FieldKind::array(FieldKind::of::<f64>()))
    }

    fn store(&self, graph: &mut ObjectGraph) -> Result<ObjectId, GraphError> {
        Ok(graph.insert(Self::TYPE_NAME, vec![
            Value::scalar(self.id),
            Value::scalar(self.label.as_str()),
            Value::array_of(&self.values),
        ]))
    }

    fn load(cx: &mut LoadContext<'_>, id: ObjectId) -> Result<Self, GraphError> {
        let o = expect_type::<Self>(cx, id)?;
        Ok(Self {
            id:     o.primitive_or_default(0)?,
            label:  o.primitive_or_default(1)?,
            values: o.field(2)?.to_vec()?.unwrap_or_default(),
        })
    }
}

fn bench_graph(c: &mut Criterion) {
    let sample = Sample { id: 7, label: "benchmark".into(), values: (0..256).map(f64::from).collect() };
    let bytes = compact::serialize(&sample).unwrap();

    c.bench_function("graph_serialize_256_f64", |b| {
        b.iter(|| compact::serialize(black_box(&sample)).unwrap())
    });
    c.bench_function("graph_deserialize_256_f64", |b| {
        b.iter(|| compact::deserialize::<Sample>(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_write, bench_read, bench_graph);
criterion_main!(benches);
