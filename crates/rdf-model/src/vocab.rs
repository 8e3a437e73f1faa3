//! Standard vocabularies (RDF, RDFS, OWL, XSD)

/// Well-known vocabulary IRIs used across the engine
pub struct Vocabulary;

impl Vocabulary {
    // RDF namespace
    /// RDF namespace IRI
    pub const RDF_NS: &'static str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    /// rdf:type - class membership
    pub const RDF_TYPE: &'static str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    /// rdf:langString - datatype of language-tagged literals
    pub const RDF_LANG_STRING: &'static str =
        "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
    /// rdf:dirLangString - datatype of directional language-tagged literals
    pub const RDF_DIR_LANG_STRING: &'static str =
        "http://www.w3.org/1999/02/22-rdf-syntax-ns#dirLangString";

    // RDFS namespace
    /// RDFS namespace IRI
    pub const RDFS_NS: &'static str = "http://www.w3.org/2000/01/rdf-schema#";
    /// rdfs:subClassOf - class hierarchy
    pub const RDFS_SUBCLASSOF: &'static str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
    /// rdfs:label - human-readable label
    pub const RDFS_LABEL: &'static str = "http://www.w3.org/2000/01/rdf-schema#label";
    /// rdfs:comment - human-readable description
    pub const RDFS_COMMENT: &'static str = "http://www.w3.org/2000/01/rdf-schema#comment";

    // OWL namespace
    /// OWL namespace IRI
    pub const OWL_NS: &'static str = "http://www.w3.org/2002/07/owl#";
    /// owl:sameAs - individual identity
    pub const OWL_SAME_AS: &'static str = "http://www.w3.org/2002/07/owl#sameAs";

    // XSD namespace
    /// XSD namespace IRI
    pub const XSD_NS: &'static str = "http://www.w3.org/2001/XMLSchema#";
    /// xsd:string
    pub const XSD_STRING: &'static str = "http://www.w3.org/2001/XMLSchema#string";
    /// xsd:integer
    pub const XSD_INTEGER: &'static str = "http://www.w3.org/2001/XMLSchema#integer";
    /// xsd:decimal
    pub const XSD_DECIMAL: &'static str = "http://www.w3.org/2001/XMLSchema#decimal";
    /// xsd:double
    pub const XSD_DOUBLE: &'static str = "http://www.w3.org/2001/XMLSchema#double";
    /// xsd:float
    pub const XSD_FLOAT: &'static str = "http://www.w3.org/2001/XMLSchema#float";
    /// xsd:boolean
    pub const XSD_BOOLEAN: &'static str = "http://www.w3.org/2001/XMLSchema#boolean";
    /// xsd:date
    pub const XSD_DATE: &'static str = "http://www.w3.org/2001/XMLSchema#date";
    /// xsd:dateTime
    pub const XSD_DATETIME: &'static str = "http://www.w3.org/2001/XMLSchema#dateTime";
    /// xsd:dayTimeDuration
    pub const XSD_DAY_TIME_DURATION: &'static str =
        "http://www.w3.org/2001/XMLSchema#dayTimeDuration";

    /// Whether a datatype IRI denotes one of the XSD numeric types
    pub fn is_numeric_datatype(datatype: &str) -> bool {
        matches!(
            datatype,
            "http://www.w3.org/2001/XMLSchema#integer"
                | "http://www.w3.org/2001/XMLSchema#decimal"
                | "http://www.w3.org/2001/XMLSchema#float"
                | "http://www.w3.org/2001/XMLSchema#double"
                | "http://www.w3.org/2001/XMLSchema#int"
                | "http://www.w3.org/2001/XMLSchema#long"
                | "http://www.w3.org/2001/XMLSchema#short"
                | "http://www.w3.org/2001/XMLSchema#byte"
                | "http://www.w3.org/2001/XMLSchema#nonPositiveInteger"
                | "http://www.w3.org/2001/XMLSchema#negativeInteger"
                | "http://www.w3.org/2001/XMLSchema#nonNegativeInteger"
                | "http://www.w3.org/2001/XMLSchema#positiveInteger"
                | "http://www.w3.org/2001/XMLSchema#unsignedLong"
                | "http://www.w3.org/2001/XMLSchema#unsignedInt"
                | "http://www.w3.org/2001/XMLSchema#unsignedShort"
                | "http://www.w3.org/2001/XMLSchema#unsignedByte"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_consistent() {
        assert!(Vocabulary::RDF_TYPE.starts_with(Vocabulary::RDF_NS));
        assert!(Vocabulary::RDFS_SUBCLASSOF.starts_with(Vocabulary::RDFS_NS));
        assert!(Vocabulary::OWL_SAME_AS.starts_with(Vocabulary::OWL_NS));
        assert!(Vocabulary::XSD_STRING.starts_with(Vocabulary::XSD_NS));
    }

    #[test]
    fn numeric_datatype_test() {
        assert!(Vocabulary::is_numeric_datatype(Vocabulary::XSD_INTEGER));
        assert!(Vocabulary::is_numeric_datatype(Vocabulary::XSD_DECIMAL));
        assert!(!Vocabulary::is_numeric_datatype(Vocabulary::XSD_STRING));
        assert!(!Vocabulary::is_numeric_datatype(Vocabulary::XSD_BOOLEAN));
    }
}
