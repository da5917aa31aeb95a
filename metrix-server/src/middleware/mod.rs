// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

pub mod envelope;
pub mod subnet;

pub use envelope::{
    compression_layer, open_envelope_middleware, sign_response_middleware, HASH_HEADER,
    MAX_BODY_BYTES,
};
pub use subnet::{trusted_subnet_middleware, TrustedSubnet, REAL_IP_HEADER};
