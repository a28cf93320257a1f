use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dltwire_buffer::SharedRing;

fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "dltwire-ring-{name}-{}-{nanos}",
        std::process::id()
    ))
}

#[test]
fn producer_and_consumer_preserve_order() {
    const RECORDS: u32 = 500;

    let path = temp_path("order");
    let mut consumer = SharedRing::create(&path, 1024).unwrap();
    let producer_path = path.clone();

    let producer = thread::spawn(move || {
        let mut ring = SharedRing::open(&producer_path).unwrap();
        let mut next = 0u32;
        while next < RECORDS {
            let pushed = ring.lock().unwrap().push(&[&next.to_le_bytes()]).is_ok();
            if pushed {
                next += 1;
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
    });

    let mut expected = 0u32;
    while expected < RECORDS {
        let record = consumer.lock().unwrap().pull().unwrap();
        match record {
            Some(bytes) => {
                let value = u32::from_le_bytes(bytes.try_into().unwrap());
                assert_eq!(value, expected);
                expected += 1;
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
    }

    producer.join().unwrap();
    assert_eq!(consumer.lock().unwrap().message_count(), 0);
}
