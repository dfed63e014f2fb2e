// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::downcast::*;
pub use self::message_accumulator::MessageAccumulator;
pub use self::set_multimap::SetMultimap;

mod downcast;
mod message_accumulator;
mod set_multimap;
