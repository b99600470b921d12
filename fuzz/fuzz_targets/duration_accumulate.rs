#![no_main]

use calltrace::clock::Timestamp;
use calltrace::duration::CallDuration;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Each 24-byte chunk is (start_ns, end_ns, seed for the running total)
    let mut total = CallDuration::ZERO;
    for chunk in data.chunks_exact(24) {
        let a = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
        let b = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
        let (start, end) = if a <= b { (a, b) } else { (b, a) };

        let before = total;
        total.accumulate(Timestamp::from_nanos(start), Timestamp::from_nanos(end));
        assert!(total >= before);
        assert!(total.subsec_nanos() < 1_000_000_000);

        let extra = CallDuration::from_nanos(u64::from_le_bytes(chunk[16..24].try_into().unwrap()));
        let sum = total + extra;
        assert!(sum >= total);
    }
});
