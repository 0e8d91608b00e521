/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

pub type Rand = fn(&mut [u8]);

pub fn dummy_rand(buf: &mut [u8]) {
    // Deterministic, but not all-zeroes, so counters and exchange IDs stay distinct in tests
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (i % 256) as u8;
    }
}

#[cfg(feature = "std")]
pub fn sys_rand(buf: &mut [u8]) {
    use rand::{thread_rng, RngCore};

    thread_rng().fill_bytes(buf);
}

pub fn rand_u16(rand: Rand) -> u16 {
    let mut buf = [0; 2];
    rand(&mut buf);
    u16::from_le_bytes(buf)
}

pub fn rand_u32(rand: Rand) -> u32 {
    let mut buf = [0; 4];
    rand(&mut buf);
    u32::from_le_bytes(buf)
}
