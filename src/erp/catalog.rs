//! Fixed section and group names of the product catalog.
//!
//! The ERP stores only numeric codes; the names below are the ones the
//! company uses and change only with a catalog overhaul.

const SECTIONS: [(i64, &str); 8] = [
    (1, "Ativo"),
    (2, "Brinquedos"),
    (3, "Combustível"),
    (4, "Uso e Consumo"),
    (5, "Diversos"),
    (6, "Hortifruti"),
    (7, "Laticínios"),
    (8, "Mercearia"),
];

const GROUPS: [(i64, &str); 25] = [
    (1, "Ativo"),
    (2, "Bebidas"),
    (3, "Bebidas"),
    (4, "Bebidas"),
    (5, "Bombonier"),
    (6, "Bombonier"),
    (7, "Brinquedos"),
    (8, "Brinquedos"),
    (9, "Combustivel"),
    (10, "Condimentos"),
    (11, "Consumo"),
    (12, "Folhas"),
    (13, "Folhas"),
    (14, "Frutas"),
    (15, "Mercearia"),
    (16, "Mercearia"),
    (17, "Mercearia"),
    (18, "Mercearia"),
    (19, "Padaria"),
    (20, "Picadinhos"),
    (21, "Picadinhos"),
    (22, "Sucos"),
    (23, "Verdura"),
    (24, "Verdura"),
    (25, "Sorvetes"),
];

/// Section code of the produce shown in the client portal.
pub(crate) const PRODUCE_SECTION: i64 = 6;

fn lookup(table: &[(i64, &'static str)], code: Option<i64>) -> Option<&'static str> {
    let code = code?;
    table.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

/// Section name, `Desconhecida` when unknown.
pub fn section_name(code: Option<i64>) -> &'static str {
    lookup(&SECTIONS, code).unwrap_or("Desconhecida")
}

/// Group name, `Desconhecido` when unknown.
pub fn group_name(code: Option<i64>) -> &'static str {
    lookup(&GROUPS, code).unwrap_or("Desconhecido")
}
