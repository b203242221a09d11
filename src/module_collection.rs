// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The module collection (C9): name/UID/table/type resolution over an
//! ordered union of specification modules. The Core module is always
//! loaded; the Opal module layers Opal-SSC-specific rows above it.
//! Published as a process-wide read-only singleton, the way the corpus
//! publishes its own lazily-initialized shared state.

use once_cell::sync::Lazy;

use crate::data::{ColumnDesc, TableDesc, TableKind, Type};
use crate::uid::Uid;
use crate::uids::{authority, c_pin, method, sp, table, ty};

/// One named `(uid, name)` row, optionally scoped to a particular SP.
#[derive(Debug, Clone, Copy)]
struct NameRow {
    uid: Uid,
    name: &'static str,
    sp: Option<Uid>,
}

/// A self-contained set of UID/name/table/type rows. Queried in the order
/// modules are loaded: Feature modules before SSC modules, before Core.
pub trait Module: Send + Sync {
    fn find_name(&self, uid: Uid, sp: Option<Uid>) -> Option<&'static str>;
    fn find_uid(&self, name: &str, sp: Option<Uid>) -> Option<Uid>;
    fn find_table(&self, uid: Uid) -> Option<&TableDesc>;
    fn find_type(&self, uid: Uid) -> Option<&Type>;
}

struct StaticModule {
    names: Vec<NameRow>,
    tables: Vec<(Uid, TableDesc)>,
    types: Vec<(Uid, Type)>,
}

impl Module for StaticModule {
    fn find_name(&self, uid: Uid, sp: Option<Uid>) -> Option<&'static str> {
        self.names
            .iter()
            .find(|row| row.uid == uid && (row.sp.is_none() || row.sp == sp))
            .map(|row| row.name)
    }

    fn find_uid(&self, name: &str, sp: Option<Uid>) -> Option<Uid> {
        self.names
            .iter()
            .find(|row| row.name == name && (row.sp.is_none() || row.sp == sp))
            .map(|row| row.uid)
    }

    fn find_table(&self, uid: Uid) -> Option<&TableDesc> {
        self.tables.iter().find(|(u, _)| *u == uid).map(|(_, desc)| desc)
    }

    fn find_type(&self, uid: Uid) -> Option<&Type> {
        self.types.iter().find(|(u, _)| *u == uid).map(|(_, ty)| ty)
    }
}

fn core_module() -> StaticModule {
    let names = vec![
        NameRow { uid: method::PROPERTIES, name: "Properties", sp: None },
        NameRow { uid: method::START_SESSION, name: "StartSession", sp: None },
        NameRow { uid: method::SYNC_SESSION, name: "SyncSession", sp: None },
        NameRow { uid: method::CLOSE_SESSION, name: "CloseSession", sp: None },
        NameRow { uid: method::NEXT, name: "Next", sp: None },
        NameRow { uid: method::GET_ACL, name: "GetACL", sp: None },
        NameRow { uid: method::GEN_KEY, name: "GenKey", sp: None },
        NameRow { uid: method::GET, name: "Get", sp: None },
        NameRow { uid: method::SET, name: "Set", sp: None },
        NameRow { uid: method::AUTHENTICATE, name: "Authenticate", sp: None },
        NameRow { uid: table::TABLE, name: "Table", sp: None },
        NameRow { uid: table::SP, name: "SP", sp: None },
        NameRow { uid: table::AUTHORITY, name: "Authority", sp: None },
        NameRow { uid: table::C_PIN, name: "C_PIN", sp: None },
        NameRow { uid: table::LOCKING, name: "Locking", sp: None },
        NameRow { uid: table::MBR_CONTROL, name: "MBRControl", sp: None },
        NameRow { uid: table::K_AES_256, name: "K_AES_256", sp: None },
        NameRow { uid: authority::ANYBODY, name: "Authority::Anybody", sp: None },
        NameRow { uid: authority::ADMINS, name: "Authority::Admins", sp: None },
    ];

    let tables = vec![(
        table::C_PIN,
        TableDesc {
            name: "C_PIN".to_string(),
            kind: TableKind::Object,
            single_row: None,
            columns: vec![
                ColumnDesc { name: "UID".to_string(), is_unique: true, ty: Type::GeneralReference { byte_kind: false } },
                ColumnDesc { name: "Name".to_string(), is_unique: false, ty: Type::Bytes { length: 32, fixed: false } },
                ColumnDesc { name: "CommonName".to_string(), is_unique: false, ty: Type::Bytes { length: 32, fixed: false } },
                ColumnDesc { name: "PIN".to_string(), is_unique: false, ty: Type::Bytes { length: 32, fixed: false } },
                ColumnDesc { name: "CharSet".to_string(), is_unique: false, ty: Type::GeneralReference { byte_kind: false } },
                ColumnDesc { name: "TryLimit".to_string(), is_unique: false, ty: Type::Integer { width: 4, signed: false } },
                ColumnDesc { name: "Tries".to_string(), is_unique: false, ty: Type::Integer { width: 4, signed: false } },
                ColumnDesc { name: "Persistence".to_string(), is_unique: false, ty: Type::Integer { width: 1, signed: false } },
            ],
        },
    )];

    let types = vec![(ty::GENERAL_OBJECT_REF, Type::GeneralReference { byte_kind: false })];

    StaticModule { names, tables, types }
}

fn opal_module() -> StaticModule {
    let names = vec![
        NameRow { uid: sp::ADMIN, name: "SP::Admin", sp: None },
        NameRow { uid: sp::LOCKING, name: "SP::Locking", sp: None },
        NameRow { uid: authority::SID, name: "Authority::SID", sp: None },
        NameRow { uid: authority::PSID, name: "Authority::PSID", sp: None },
        NameRow { uid: c_pin::SID, name: "C_PIN::SID", sp: Some(sp::ADMIN) },
        NameRow { uid: c_pin::MSID, name: "C_PIN::MSID", sp: Some(sp::ADMIN) },
        NameRow { uid: c_pin::ADMIN1, name: "C_PIN::Admin1", sp: Some(sp::ADMIN) },
        NameRow { uid: method::REVERT, name: "Revert", sp: None },
        NameRow { uid: method::ACTIVATE, name: "Activate", sp: None },
    ];
    let types = vec![
        (ty::CREDENTIAL_OBJECT_REF, Type::RestrictedReference { tables: vec![table::C_PIN], byte_kind: false }),
        (ty::AUTHORITY_OBJECT_REF, Type::RestrictedReference { tables: vec![table::AUTHORITY], byte_kind: false }),
    ];
    StaticModule { names, tables: vec![], types }
}

/// A searchable, ordered union of loaded modules: Opal before Core.
pub struct ModuleCollection {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleCollection {
    pub fn find_name(&self, uid: Uid, sp: Option<Uid>) -> Option<&'static str> {
        self.modules.iter().find_map(|m| m.find_name(uid, sp))
    }

    pub fn find_uid(&self, name: &str, sp: Option<Uid>) -> Option<Uid> {
        self.modules.iter().find_map(|m| m.find_uid(name, sp))
    }

    pub fn find_table(&self, uid: Uid) -> Option<&TableDesc> {
        self.modules.iter().find_map(|m| m.find_table(uid))
    }

    pub fn find_type(&self, uid: Uid) -> Option<&Type> {
        self.modules.iter().find_map(|m| m.find_type(uid))
    }
}

static MODULES: Lazy<ModuleCollection> =
    Lazy::new(|| ModuleCollection { modules: vec![Box::new(opal_module()), Box::new(core_module())] });

/// The process-wide, read-only module collection.
pub fn modules() -> &'static ModuleCollection {
    &MODULES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_core_method_names_both_ways() {
        let modules = modules();
        assert_eq!(modules.find_name(method::PROPERTIES, None), Some("Properties"));
        assert_eq!(modules.find_uid("Properties", None), Some(method::PROPERTIES));
    }

    #[test]
    fn resolves_sp_scoped_msid() {
        let modules = modules();
        assert_eq!(modules.find_uid("C_PIN::MSID", Some(sp::ADMIN)), Some(c_pin::MSID));
    }

    #[test]
    fn opal_names_are_searched_before_core_has_a_chance_to_miss() {
        let modules = modules();
        assert_eq!(modules.find_name(c_pin::MSID, Some(sp::ADMIN)), Some("C_PIN::MSID"));
    }

    #[test]
    fn core_table_lookup_returns_c_pin_descriptor() {
        let desc = modules().find_table(table::C_PIN).expect("C_PIN table descriptor");
        assert_eq!(desc.name, "C_PIN");
        assert!(desc.column(3).is_some());
    }

    #[test]
    fn find_type_resolves_opal_credential_object_reference() {
        let found = modules().find_type(ty::CREDENTIAL_OBJECT_REF).expect("credential object reference type");
        assert_eq!(*found, Type::RestrictedReference { tables: vec![table::C_PIN], byte_kind: false });
    }

    #[test]
    fn find_type_resolves_core_general_object_reference() {
        let found = modules().find_type(ty::GENERAL_OBJECT_REF).expect("general object reference type");
        assert_eq!(*found, Type::GeneralReference { byte_kind: false });
    }

    #[test]
    fn find_type_misses_unregistered_uid() {
        assert!(modules().find_type(Uid(0xFFFF_FFFF_FFFF_CCCC)).is_none());
    }
}
