// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod token;
pub mod type_desc;
pub mod value;

pub use token::{decode_token, decode_token_stream, encode_token, AtomTag, Command, Token};
pub use type_desc::{ColumnDesc, TableDesc, TableKind, Type};
pub use value::{detokenize, surround_with_list, tokenize, unsurround_with_list, Value};
