//! Immutable reference list of countries: ISO3 code, official name, aliases.

use once_cell::sync::OnceCell;
use std::{
    collections::{hash_map::Entry, BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};
use tracing::info;

use super::normalize::{fold, looks_like_iso3};
use crate::error::{PipelineError, PipelineResult, ReferenceError};
use crate::table::{read_csv, RawTable};

/// One country of the reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryEntry {
    pub iso3: String,
    pub name: String,
    pub aliases: Vec<String>,
}

/// Whether a folded key came from the official name or an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Name,
    Alias,
}

/// Indexed, read-only country list. Built once per run and shared via `Arc`.
#[derive(Debug)]
pub struct ReferenceList {
    entries: Vec<CountryEntry>,
    by_code: HashMap<String, usize>,
    by_key: HashMap<String, (usize, KeyKind)>,
    /// (folded key, entry index), sorted by key.
    candidates: Vec<(String, usize)>,
}

impl ReferenceList {
    pub fn new(entries: Vec<CountryEntry>) -> Result<Self, ReferenceError> {
        let mut by_code = HashMap::with_capacity(entries.len());
        let mut by_key: HashMap<String, (usize, KeyKind)> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            if !looks_like_iso3(&entry.iso3) {
                return Err(ReferenceError::InvalidCode(entry.iso3.clone()));
            }
            if by_code.insert(entry.iso3.clone(), idx).is_some() {
                return Err(ReferenceError::DuplicateCode(entry.iso3.clone()));
            }

            let names = std::iter::once((&entry.name, KeyKind::Name))
                .chain(entry.aliases.iter().map(|a| (a, KeyKind::Alias)));
            for (text, kind) in names {
                let key = fold(text);
                if key.is_empty() {
                    continue;
                }
                match by_key.entry(key) {
                    Entry::Vacant(v) => {
                        v.insert((idx, kind));
                    }
                    Entry::Occupied(o) if o.get().0 == idx => {}
                    Entry::Occupied(o) => {
                        return Err(ReferenceError::KeyConflict {
                            key: o.key().clone(),
                            first: entries[o.get().0].iso3.clone(),
                            second: entry.iso3.clone(),
                        });
                    }
                }
            }
        }

        let mut candidates: Vec<(String, usize)> =
            by_key.iter().map(|(k, (idx, _))| (k.clone(), *idx)).collect();
        candidates.sort();

        Ok(Self {
            entries,
            by_code,
            by_key,
            candidates,
        })
    }

    /// The compiled-in list, built on first use and shared for the process.
    pub fn builtin() -> PipelineResult<Arc<ReferenceList>> {
        static BUILTIN: OnceCell<Arc<ReferenceList>> = OnceCell::new();
        BUILTIN
            .get_or_try_init(|| {
                let entries = BUILTIN_COUNTRIES
                    .iter()
                    .map(|(iso3, name, aliases)| CountryEntry {
                        iso3: iso3.to_string(),
                        name: name.to_string(),
                        aliases: aliases.iter().map(|a| a.to_string()).collect(),
                    })
                    .collect();
                ReferenceList::new(entries).map(Arc::new)
            })
            .cloned()
            .map_err(PipelineError::from)
    }

    /// Load a list from an `iso3,name,aliases` CSV; aliases are `;`-separated.
    pub fn from_csv(path: impl AsRef<Path>) -> PipelineResult<Arc<ReferenceList>> {
        let path = path.as_ref();
        let table = read_csv(path)?;
        let list = Self::from_table(&table)?;
        info!(path = %path.display(), countries = list.len(), "loaded country reference");
        Ok(Arc::new(list))
    }

    pub fn from_table(table: &RawTable) -> PipelineResult<ReferenceList> {
        let col = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                PipelineError::Config(format!("reference table lacks `{name}` column"))
            })
        };
        let (iso3, name) = (col("iso3")?, col("name")?);
        let aliases = table.column_index("aliases");

        let entries = (0..table.len())
            .map(|r| CountryEntry {
                iso3: table.cell(r, iso3).to_string(),
                name: table.cell(r, name).to_string(),
                aliases: aliases
                    .map(|c| {
                        table
                            .cell(r, c)
                            .split(';')
                            .map(str::trim)
                            .filter(|a| !a.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();
        Ok(ReferenceList::new(entries)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CountryEntry] {
        &self.entries
    }

    pub fn by_code(&self, iso3: &str) -> Option<&CountryEntry> {
        self.by_code.get(iso3).map(|&i| &self.entries[i])
    }

    /// Exact lookup of an already-folded key.
    pub fn by_key(&self, key: &str) -> Option<(&CountryEntry, KeyKind)> {
        self.by_key.get(key).map(|&(i, k)| (&self.entries[i], k))
    }

    /// Every (folded key, entry) pair, in key order.
    pub fn candidates(&self) -> impl Iterator<Item = (&str, &CountryEntry)> {
        self.candidates
            .iter()
            .map(|(k, i)| (k.as_str(), &self.entries[*i]))
    }

    /// Code -> canonical name, sorted by code.
    pub fn names(&self) -> BTreeMap<&str, &str> {
        self.entries
            .iter()
            .map(|e| (e.iso3.as_str(), e.name.as_str()))
            .collect()
    }
}

/// ISO 3166-1 countries plus Kosovo (XKX, as used by the World Bank). Aliases
/// cover World Bank and WHO spellings.
const BUILTIN_COUNTRIES: &[(&str, &str, &[&str])] = &[
    ("ABW", "Aruba", &[]),
    ("AFG", "Afghanistan", &["Islamic Republic of Afghanistan"]),
    ("AGO", "Angola", &[]),
    ("AIA", "Anguilla", &[]),
    ("ALA", "Åland Islands", &["Aland"]),
    ("ALB", "Albania", &[]),
    ("AND", "Andorra", &[]),
    ("ARE", "United Arab Emirates", &["UAE", "Emirates"]),
    ("ARG", "Argentina", &[]),
    ("ARM", "Armenia", &[]),
    ("ASM", "American Samoa", &[]),
    ("ATA", "Antarctica", &[]),
    ("ATF", "French Southern Territories", &["French Southern and Antarctic Lands"]),
    ("ATG", "Antigua and Barbuda", &[]),
    ("AUS", "Australia", &[]),
    ("AUT", "Austria", &[]),
    ("AZE", "Azerbaijan", &[]),
    ("BDI", "Burundi", &[]),
    ("BEL", "Belgium", &[]),
    ("BEN", "Benin", &[]),
    ("BES", "Bonaire, Sint Eustatius and Saba", &["Caribbean Netherlands"]),
    ("BFA", "Burkina Faso", &[]),
    ("BGD", "Bangladesh", &[]),
    ("BGR", "Bulgaria", &[]),
    ("BHR", "Bahrain", &[]),
    ("BHS", "Bahamas", &["Bahamas, The", "Commonwealth of the Bahamas"]),
    ("BIH", "Bosnia and Herzegovina", &["Bosnia-Herzegovina", "Bosnia"]),
    ("BLM", "Saint Barthélemy", &[]),
    ("BLR", "Belarus", &["Byelorussia"]),
    ("BLZ", "Belize", &[]),
    ("BMU", "Bermuda", &[]),
    (
        "BOL",
        "Bolivia, Plurinational State of",
        &["Bolivia", "Bolivia (Plurinational State of)", "Plurinational State of Bolivia"],
    ),
    ("BRA", "Brazil", &[]),
    ("BRB", "Barbados", &[]),
    ("BRN", "Brunei Darussalam", &["Brunei"]),
    ("BTN", "Bhutan", &[]),
    ("BVT", "Bouvet Island", &[]),
    ("BWA", "Botswana", &[]),
    ("CAF", "Central African Republic", &["CAR"]),
    ("CAN", "Canada", &[]),
    ("CCK", "Cocos (Keeling) Islands", &["Cocos Islands"]),
    ("CHE", "Switzerland", &["Swiss Confederation"]),
    ("CHL", "Chile", &[]),
    ("CHN", "China", &["People's Republic of China", "China, People's Republic of"]),
    ("CIV", "Côte d'Ivoire", &["Ivory Coast"]),
    ("CMR", "Cameroon", &[]),
    (
        "COD",
        "Congo, The Democratic Republic of the",
        &[
            "Democratic Republic of the Congo",
            "Congo, Dem. Rep.",
            "DR Congo",
            "DRC",
            "Congo (Kinshasa)",
            "Congo-Kinshasa",
            "Zaire",
        ],
    ),
    (
        "COG",
        "Congo",
        &["Republic of the Congo", "Congo, Rep.", "Congo (Brazzaville)", "Congo-Brazzaville"],
    ),
    ("COK", "Cook Islands", &[]),
    ("COL", "Colombia", &[]),
    ("COM", "Comoros", &[]),
    ("CPV", "Cabo Verde", &["Cape Verde"]),
    ("CRI", "Costa Rica", &[]),
    ("CUB", "Cuba", &[]),
    ("CUW", "Curaçao", &[]),
    ("CXR", "Christmas Island", &[]),
    ("CYM", "Cayman Islands", &[]),
    ("CYP", "Cyprus", &[]),
    ("CZE", "Czechia", &["Czech Republic"]),
    ("DEU", "Germany", &["Federal Republic of Germany", "Deutschland"]),
    ("DJI", "Djibouti", &[]),
    ("DMA", "Dominica", &[]),
    ("DNK", "Denmark", &[]),
    ("DOM", "Dominican Republic", &[]),
    ("DZA", "Algeria", &[]),
    ("ECU", "Ecuador", &[]),
    ("EGY", "Egypt", &["Egypt, Arab Rep.", "Arab Republic of Egypt"]),
    ("ERI", "Eritrea", &[]),
    ("ESH", "Western Sahara", &[]),
    ("ESP", "Spain", &[]),
    ("EST", "Estonia", &[]),
    ("ETH", "Ethiopia", &[]),
    ("FIN", "Finland", &[]),
    ("FJI", "Fiji", &[]),
    ("FLK", "Falkland Islands (Malvinas)", &["Falkland Islands"]),
    ("FRA", "France", &["French Republic"]),
    ("FRO", "Faroe Islands", &["Faeroe Islands"]),
    (
        "FSM",
        "Micronesia, Federated States of",
        &["Micronesia", "Micronesia, Fed. Sts.", "Micronesia (Federated States of)"],
    ),
    ("GAB", "Gabon", &[]),
    (
        "GBR",
        "United Kingdom",
        &[
            "United Kingdom of Great Britain and Northern Ireland",
            "UK",
            "Great Britain",
            "Britain",
        ],
    ),
    ("GEO", "Georgia", &[]),
    ("GGY", "Guernsey", &[]),
    ("GHA", "Ghana", &[]),
    ("GIB", "Gibraltar", &[]),
    ("GIN", "Guinea", &[]),
    ("GLP", "Guadeloupe", &[]),
    ("GMB", "Gambia", &["Gambia, The", "Republic of the Gambia"]),
    ("GNB", "Guinea-Bissau", &[]),
    ("GNQ", "Equatorial Guinea", &[]),
    ("GRC", "Greece", &["Hellenic Republic"]),
    ("GRD", "Grenada", &[]),
    ("GRL", "Greenland", &[]),
    ("GTM", "Guatemala", &[]),
    ("GUF", "French Guiana", &[]),
    ("GUM", "Guam", &[]),
    ("GUY", "Guyana", &[]),
    ("HKG", "Hong Kong", &["Hong Kong SAR, China", "China, Hong Kong SAR", "Hong Kong SAR"]),
    ("HMD", "Heard Island and McDonald Islands", &[]),
    ("HND", "Honduras", &[]),
    ("HRV", "Croatia", &[]),
    ("HTI", "Haiti", &[]),
    ("HUN", "Hungary", &[]),
    ("IDN", "Indonesia", &[]),
    ("IMN", "Isle of Man", &[]),
    ("IND", "India", &[]),
    ("IOT", "British Indian Ocean Territory", &[]),
    ("IRL", "Ireland", &["Republic of Ireland"]),
    (
        "IRN",
        "Iran, Islamic Republic of",
        &["Iran", "Iran, Islamic Rep.", "Iran (Islamic Republic of)", "Islamic Republic of Iran"],
    ),
    ("IRQ", "Iraq", &[]),
    ("ISL", "Iceland", &[]),
    ("ISR", "Israel", &[]),
    ("ITA", "Italy", &[]),
    ("JAM", "Jamaica", &[]),
    ("JEY", "Jersey", &[]),
    ("JOR", "Jordan", &[]),
    ("JPN", "Japan", &[]),
    ("KAZ", "Kazakhstan", &[]),
    ("KEN", "Kenya", &[]),
    ("KGZ", "Kyrgyzstan", &["Kyrgyz Republic"]),
    ("KHM", "Cambodia", &[]),
    ("KIR", "Kiribati", &[]),
    ("KNA", "Saint Kitts and Nevis", &["St. Kitts and Nevis"]),
    (
        "KOR",
        "Korea, Republic of",
        &["Republic of Korea", "South Korea", "Korea, Rep.", "Korea (Republic of)"],
    ),
    ("KWT", "Kuwait", &[]),
    (
        "LAO",
        "Lao People's Democratic Republic",
        &["Lao PDR", "Laos"],
    ),
    ("LBN", "Lebanon", &[]),
    ("LBR", "Liberia", &[]),
    ("LBY", "Libya", &["Libyan Arab Jamahiriya"]),
    ("LCA", "Saint Lucia", &[]),
    ("LIE", "Liechtenstein", &[]),
    ("LKA", "Sri Lanka", &[]),
    ("LSO", "Lesotho", &[]),
    ("LTU", "Lithuania", &[]),
    ("LUX", "Luxembourg", &[]),
    ("LVA", "Latvia", &[]),
    ("MAC", "Macao", &["Macau", "Macao SAR, China", "China, Macao SAR"]),
    ("MAF", "Saint Martin (French part)", &["Saint Martin"]),
    ("MAR", "Morocco", &[]),
    ("MCO", "Monaco", &[]),
    (
        "MDA",
        "Moldova, Republic of",
        &["Moldova", "Republic of Moldova"],
    ),
    ("MDG", "Madagascar", &[]),
    ("MDV", "Maldives", &[]),
    ("MEX", "Mexico", &[]),
    ("MHL", "Marshall Islands", &[]),
    (
        "MKD",
        "North Macedonia",
        &[
            "Macedonia",
            "Republic of North Macedonia",
            "The former Yugoslav Republic of Macedonia",
            "Macedonia, FYR",
        ],
    ),
    ("MLI", "Mali", &[]),
    ("MLT", "Malta", &[]),
    ("MMR", "Myanmar", &["Burma"]),
    ("MNE", "Montenegro", &[]),
    ("MNG", "Mongolia", &[]),
    ("MNP", "Northern Mariana Islands", &[]),
    ("MOZ", "Mozambique", &[]),
    ("MRT", "Mauritania", &[]),
    ("MSR", "Montserrat", &[]),
    ("MTQ", "Martinique", &[]),
    ("MUS", "Mauritius", &[]),
    ("MWI", "Malawi", &[]),
    ("MYS", "Malaysia", &[]),
    ("MYT", "Mayotte", &[]),
    ("NAM", "Namibia", &[]),
    ("NCL", "New Caledonia", &[]),
    ("NER", "Niger", &[]),
    ("NFK", "Norfolk Island", &[]),
    ("NGA", "Nigeria", &[]),
    ("NIC", "Nicaragua", &[]),
    ("NIU", "Niue", &[]),
    (
        "NLD",
        "Netherlands",
        &["Netherlands (Kingdom of the)", "Kingdom of the Netherlands", "Holland"],
    ),
    ("NOR", "Norway", &[]),
    ("NPL", "Nepal", &[]),
    ("NRU", "Nauru", &[]),
    ("NZL", "New Zealand", &[]),
    ("OMN", "Oman", &[]),
    ("PAK", "Pakistan", &[]),
    ("PAN", "Panama", &[]),
    ("PCN", "Pitcairn", &["Pitcairn Islands"]),
    ("PER", "Peru", &[]),
    ("PHL", "Philippines", &[]),
    ("PLW", "Palau", &[]),
    ("PNG", "Papua New Guinea", &[]),
    ("POL", "Poland", &[]),
    ("PRI", "Puerto Rico", &[]),
    (
        "PRK",
        "Korea, Democratic People's Republic of",
        &[
            "Democratic People's Republic of Korea",
            "North Korea",
            "Korea, Dem. People's Rep.",
            "Korea, Dem. Rep.",
        ],
    ),
    ("PRT", "Portugal", &[]),
    ("PRY", "Paraguay", &[]),
    (
        "PSE",
        "Palestine, State of",
        &[
            "State of Palestine",
            "Palestine",
            "West Bank and Gaza",
            "occupied Palestinian territory",
            "occupied Palestinian territory, including east Jerusalem",
            "Palestinian Territories",
        ],
    ),
    ("PYF", "French Polynesia", &[]),
    ("QAT", "Qatar", &[]),
    ("REU", "Réunion", &[]),
    ("ROU", "Romania", &["Rumania"]),
    ("RUS", "Russian Federation", &["Russia"]),
    ("RWA", "Rwanda", &[]),
    ("SAU", "Saudi Arabia", &[]),
    ("SDN", "Sudan", &[]),
    ("SEN", "Senegal", &[]),
    ("SGP", "Singapore", &[]),
    ("SGS", "South Georgia and the South Sandwich Islands", &[]),
    (
        "SHN",
        "Saint Helena, Ascension and Tristan da Cunha",
        &["Saint Helena"],
    ),
    ("SJM", "Svalbard and Jan Mayen", &[]),
    ("SLB", "Solomon Islands", &[]),
    ("SLE", "Sierra Leone", &[]),
    ("SLV", "El Salvador", &[]),
    ("SMR", "San Marino", &[]),
    ("SOM", "Somalia", &[]),
    ("SPM", "Saint Pierre and Miquelon", &[]),
    ("SRB", "Serbia", &[]),
    ("SSD", "South Sudan", &[]),
    ("STP", "Sao Tome and Principe", &["São Tomé and Príncipe"]),
    ("SUR", "Suriname", &["Surinam"]),
    ("SVK", "Slovakia", &["Slovak Republic"]),
    ("SVN", "Slovenia", &[]),
    ("SWE", "Sweden", &[]),
    ("SWZ", "Eswatini", &["Swaziland", "Kingdom of Eswatini"]),
    ("SXM", "Sint Maarten (Dutch part)", &["Sint Maarten"]),
    ("SYC", "Seychelles", &[]),
    ("SYR", "Syrian Arab Republic", &["Syria"]),
    ("TCA", "Turks and Caicos Islands", &[]),
    ("TCD", "Chad", &[]),
    ("TGO", "Togo", &[]),
    ("THA", "Thailand", &[]),
    ("TJK", "Tajikistan", &[]),
    ("TKL", "Tokelau", &[]),
    ("TKM", "Turkmenistan", &[]),
    ("TLS", "Timor-Leste", &["East Timor"]),
    ("TON", "Tonga", &[]),
    ("TTO", "Trinidad and Tobago", &[]),
    ("TUN", "Tunisia", &[]),
    ("TUR", "Türkiye", &["Turkey", "Republic of Türkiye"]),
    ("TUV", "Tuvalu", &[]),
    ("TWN", "Taiwan, Province of China", &["Taiwan", "Taiwan, China", "Chinese Taipei"]),
    (
        "TZA",
        "Tanzania, United Republic of",
        &["Tanzania", "United Republic of Tanzania"],
    ),
    ("UGA", "Uganda", &[]),
    ("UKR", "Ukraine", &[]),
    ("UMI", "United States Minor Outlying Islands", &[]),
    ("URY", "Uruguay", &[]),
    (
        "USA",
        "United States",
        &["United States of America", "USA", "US", "U.S."],
    ),
    ("UZB", "Uzbekistan", &[]),
    ("VAT", "Holy See", &["Vatican", "Vatican City", "Holy See (Vatican City State)"]),
    (
        "VCT",
        "Saint Vincent and the Grenadines",
        &["St. Vincent and the Grenadines"],
    ),
    (
        "VEN",
        "Venezuela, Bolivarian Republic of",
        &["Venezuela", "Venezuela, RB", "Venezuela (Bolivarian Republic of)"],
    ),
    (
        "VGB",
        "Virgin Islands, British",
        &["British Virgin Islands", "Virgin Islands (British)"],
    ),
    (
        "VIR",
        "Virgin Islands, U.S.",
        &["Virgin Islands (U.S.)", "United States Virgin Islands", "US Virgin Islands"],
    ),
    ("VNM", "Viet Nam", &["Vietnam"]),
    ("VUT", "Vanuatu", &[]),
    ("WLF", "Wallis and Futuna", &[]),
    ("WSM", "Samoa", &[]),
    ("XKX", "Kosovo", &[]),
    ("YEM", "Yemen", &["Yemen, Rep.", "Republic of Yemen"]),
    ("ZAF", "South Africa", &[]),
    ("ZMB", "Zambia", &[]),
    ("ZWE", "Zimbabwe", &[]),
];
