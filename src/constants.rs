/*
Copyright 2024 - 2025 The gridpost developers

This file is part of the Gridded Ensemble Post-Processor (gridpost).

gridpost is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

gridpost is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with gridpost. If not, see https://www.gnu.org/licenses/.
*/

//! Module containing constants shared across the post-processor.

use crate::Float;

/// Sentinel marking a missing gridded or parameter value.
pub const MV: Float = -999.0;

/// Earth equatorial radius in meters, used for great-circle distances.
pub const RADIUS_EARTH: Float = 6_378_137.0;

/// Tests whether a value carries real data.
///
/// The missing test is semantic: NaN and the sentinel both count as
/// missing regardless of bit pattern.
pub fn is_valid(value: Float) -> bool {
    !value.is_nan() && value != MV
}
