//! End-to-end pipeline tests: multiple concurrent producers feeding the
//! serializer, which must still hand the encoder strictly serial calls.

use std::sync::Arc;

use bytes::Bytes;
use vma_writer::serializer::Serializer;
use vma_writer::vma::Encoder;
use vma_writer::vma::format::CLUSTER_SIZE;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_each_land_on_their_own_stream_intact() {
    let sink: Vec<u8> = Vec::new();
    let mut encoder = Encoder::new(sink);

    encoder.declare_stream(b"vmstate", 0).unwrap();
    let drive_a = encoder.declare_stream(b"a", CLUSTER_SIZE as u64 * 4).unwrap();
    let drive_b = encoder.declare_stream(b"b", CLUSTER_SIZE as u64 * 4).unwrap();

    let (serializer, closed) = Serializer::spawn(encoder);
    let serializer = Arc::new(serializer);

    let mut tasks = Vec::new();
    for (stream_id, fill) in [(drive_a, 0xAAu8), (drive_b, 0xBBu8)] {
        let serializer = serializer.clone();
        tasks.push(tokio::spawn(async move {
            let producer = serializer.producer();
            for i in 0..4u64 {
                let chunk = Bytes::from(vec![fill; CLUSTER_SIZE]);
                assert!(producer.submit_write(stream_id, i * CLUSTER_SIZE as u64, chunk));
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    serializer.producer().submit_stop();
    closed.await.unwrap().unwrap();
}

#[tokio::test]
async fn submissions_after_close_are_reported_as_undelivered() {
    let sink: Vec<u8> = Vec::new();
    let mut encoder = Encoder::new(sink);
    let vmstate_id = encoder.declare_stream(b"vmstate", 0).unwrap();

    let (serializer, closed) = Serializer::spawn(encoder);
    let producer = serializer.producer();
    assert!(producer.submit_stop());
    closed.await.unwrap().unwrap();

    assert!(!producer.submit_write(vmstate_id, 0, Bytes::from(vec![0u8; CLUSTER_SIZE])));
}
