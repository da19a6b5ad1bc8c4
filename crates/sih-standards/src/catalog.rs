//! Built-in relation catalog for hospital admission (AIH) records.

use sih_model::SemanticType::{BigInt, Code, Date, Decimal, Integer, SmallInt, Text};
use sih_model::{Predicate, Projection, RelationSchema, Shape};

/// Admission identifier; one logical episode per value.
pub const BUSINESS_KEY: &str = "N_AIH";

/// Superset of input fields. Input files are narrowed to these columns and
/// backfilled with nulls for the ones they lack.
pub const INPUT_COLUMNS: &[&str] = &[
    "ESPEC", "N_AIH", "IDENT", "CEP", "MUNIC_RES", "NASC", "SEXO", "DT_INTER", "DT_SAIDA",
    "UTI_MES_TO", "MARCA_UTI", "UTI_INT_TO", "DIAR_ACOM", "QT_DIARIAS", "PROC_REA", "VAL_SH",
    "VAL_SP", "VAL_TOT", "VAL_UTI", "NATUREZA", "CNES", "NAT_JUR", "GESTAO", "IND_VDRL", "IDADE",
    "DIAG_PRINC", "DIAG_SECUN", "COBRANCA", "MORTE", "MUNIC_MOV", "DIAS_PERM", "NACIONAL",
    "NUM_FILHOS", "INSTRU", "CID_NOTIF", "CONTRACEP1", "CONTRACEP2", "GESTRICO", "INSC_PN", "CBOR",
    "CNAER", "VINCPREV", "INFEHOSP", "CID_ASSO", "CID_MORTE", "COMPLEX", "RACA_COR", "ETNIA",
    "DIAGSEC1", "DIAGSEC2", "DIAGSEC3", "DIAGSEC4", "DIAGSEC5", "DIAGSEC6", "DIAGSEC7",
    "DIAGSEC8", "DIAGSEC9", "COD_IDADE", "CGC_HOSP",
];

fn detail(name: &str) -> RelationSchema {
    RelationSchema::new(name)
        .column(BUSINESS_KEY, BigInt)
        .primary_key([BUSINESS_KEY])
        .foreign_key(BUSINESS_KEY, "internacoes", BUSINESS_KEY)
}

/// Relations in declaration order. Declaration order breaks ties in the
/// dependency order.
pub fn standard_relations() -> Vec<RelationSchema> {
    vec![
        RelationSchema::new("internacoes")
            .column(BUSINESS_KEY, BigInt)
            .column("CNES", Code)
            .column("ESPEC", SmallInt)
            .column("IDENT", SmallInt)
            .column("DT_INTER", Date)
            .column("DT_SAIDA", Date)
            .column("DIAS_PERM", Integer)
            .column("QT_DIARIAS", Integer)
            .column("VAL_SH", Decimal)
            .column("VAL_SP", Decimal)
            .column("VAL_UTI", Decimal)
            .column("VAL_TOT", Decimal)
            .column("COMPLEX", Code)
            .column("PROC_REA", Code)
            .column("MUNIC_MOV", Code)
            .column("DIAG_PRINC", Code)
            .column("NASC", Date)
            .column("SEXO", SmallInt)
            .column("IDADE", SmallInt)
            .column("NACIONAL", SmallInt)
            .column("NUM_FILHOS", SmallInt)
            .column("RACA_COR", SmallInt)
            .column("MUNIC_RES", Code)
            .column("CEP", Code)
            .column("COBRANCA", SmallInt)
            .column("MORTE", SmallInt)
            .primary_key([BUSINESS_KEY])
            .foreign_key("CNES", "hospital", "CNES")
            .foreign_key("MUNIC_RES", "municipios", "codigo_6d")
            .foreign_key("MUNIC_MOV", "municipios", "codigo_6d")
            .foreign_key("DIAG_PRINC", "cid10", "CID")
            .foreign_key("PROC_REA", "procedimentos", "PROC_REA")
            .projected(Projection::plain()),
        RelationSchema::new("hospital")
            .column("CNES", Code)
            .column("NATUREZA", Code)
            .column("GESTAO", Code)
            .column("NAT_JUR", Code)
            .primary_key(["CNES"])
            .projected(Projection::plain().with_shape(Shape::ModeByKey {
                key: "CNES".to_string(),
            })),
        RelationSchema::new("municipios")
            .column("codigo_6d", Code)
            .column("codigo_ibge", Code)
            .column("nome", Text)
            .column("latitude", Decimal)
            .column("longitude", Decimal)
            .column("estado", Text)
            .primary_key(["codigo_6d"])
            .unique(["codigo_ibge"]),
        RelationSchema::new("cid10")
            .column("CID", Code)
            .column("CD_DESCRICAO", Text)
            .primary_key(["CID"]),
        RelationSchema::new("procedimentos")
            .column("PROC_REA", Code)
            .column("NOME_PROC", Text)
            .primary_key(["PROC_REA"]),
        detail("uti_detalhes")
            .column("UTI_MES_TO", Decimal)
            .column("MARCA_UTI", Code)
            .column("UTI_INT_TO", Decimal)
            .column("VAL_UTI", Decimal)
            .projected(Projection::filtered(Predicate::positive("VAL_UTI"))),
        detail("condicoes_especificas")
            .column("IND_VDRL", SmallInt)
            .projected(Projection::filtered(Predicate::equals("IND_VDRL", 1))),
        detail("obstetricos")
            .column("INSC_PN", Code)
            .projected(Projection::filtered(Predicate::not_sentinel("INSC_PN"))),
        detail("instrucao")
            .column("INSTRU", Code)
            .projected(Projection::filtered(Predicate::not_sentinel("INSTRU"))),
        detail("mortes")
            .column("CID_MORTE", Code)
            .foreign_key("CID_MORTE", "cid10", "CID")
            .projected(Projection::filtered(Predicate::equals("MORTE", 1))),
        detail("infehosp")
            .column("INFEHOSP", SmallInt)
            .projected(Projection::filtered(Predicate::equals("INFEHOSP", 1))),
        detail("vincprev")
            .column("VINCPREV", Code)
            .projected(Projection::filtered(Predicate::not_sentinel("VINCPREV"))),
        detail("cbor")
            .column("CBOR", Code)
            .projected(Projection::filtered(Predicate::not_sentinel("CBOR"))),
        detail("notificacoes")
            .column("CID_NOTIF", Code)
            .foreign_key("CID_NOTIF", "cid10", "CID")
            .projected(Projection::filtered(Predicate::not_sentinel("CID_NOTIF"))),
        detail("diagnosticos")
            .column("DIAG_SECUN", Code)
            .foreign_key("DIAG_SECUN", "cid10", "CID")
            .projected(Projection::filtered(Predicate::not_sentinel("DIAG_SECUN"))),
        detail("etnia")
            .column("ETNIA", Integer)
            .projected(Projection::filtered(Predicate::all([
                Predicate::equals("RACA_COR", 5),
                Predicate::not_sentinel("ETNIA"),
            ]))),
        detail("pernoite")
            .column("DIAR_ACOM", Decimal)
            .projected(Projection::filtered(Predicate::positive("DIAS_PERM"))),
        RelationSchema::new("contraceptivos")
            .column(BUSINESS_KEY, BigInt)
            .column("TIPO", Text)
            .column("CODIGO_METODO", Code)
            .primary_key([BUSINESS_KEY, "TIPO"])
            .foreign_key(BUSINESS_KEY, "internacoes", BUSINESS_KEY)
            .projected(Projection::plain().with_shape(Shape::Unpivot {
                slots: vec!["CONTRACEP1".to_string(), "CONTRACEP2".to_string()],
                label_column: "TIPO".to_string(),
                value_column: "CODIGO_METODO".to_string(),
            })),
    ]
}
