//! Time zone by Brazilian state acronym.

/// IANA time zone for a state acronym (case-insensitive).
pub fn timezone_for_uf(uf: &str) -> Option<&'static str> {
    let zone = match uf.trim().to_ascii_uppercase().as_str() {
        "AC" => "America/Rio_Branco",
        "AL" => "America/Maceio",
        "AM" => "America/Manaus",
        "AP" => "America/Belem",
        "BA" => "America/Bahia",
        "CE" => "America/Fortaleza",
        "DF" => "America/Sao_Paulo",
        "ES" => "America/Sao_Paulo",
        "GO" => "America/Sao_Paulo",
        "MA" => "America/Fortaleza",
        "MG" => "America/Sao_Paulo",
        "MS" => "America/Campo_Grande",
        "MT" => "America/Cuiaba",
        "PA" => "America/Belem",
        "PB" => "America/Fortaleza",
        "PE" => "America/Recife",
        "PI" => "America/Fortaleza",
        "PR" => "America/Sao_Paulo",
        "RJ" => "America/Sao_Paulo",
        "RN" => "America/Fortaleza",
        "RO" => "America/Porto_Velho",
        "RR" => "America/Boa_Vista",
        "RS" => "America/Sao_Paulo",
        "SC" => "America/Sao_Paulo",
        "SE" => "America/Maceio",
        "SP" => "America/Sao_Paulo",
        "TO" => "America/Araguaina",
        _ => return None,
    };
    Some(zone)
}
