//! Keyword names, argument specs and documentation as shown to Robot Framework.

use super::args::ArgSpec;

#[derive(Debug)]
pub struct KeywordSpec {
    pub name: &'static str,
    pub args: &'static [ArgSpec],
    pub doc: &'static str,
}

impl KeywordSpec {
    pub fn signatures(&self) -> Vec<String> {
        self.args.iter().map(ArgSpec::signature).collect()
    }
}

pub const INTRO: &str = "\
This library supports MongoDB related testing using the Robot Framework.

Documents, queries and index keys are given as JSON text. The mongo shell \
style is accepted as well: unquoted keys and single-quoted strings, e.g. \
`{say : 'Hello MongoDB!'}`. Extended JSON such as `{\"$oid\": \"...\"}` is \
converted to the matching BSON type. Documents returned by keywords are \
relaxed extended JSON strings.

All document, collection and index keywords work on the database selected \
by the last `Connect To Server` or `Use Database` call.";

pub const INIT_DOC: &str = "\
The remote server connects to a local MongoDB instance on startup \
(localhost:27017, database `robotdb`, unless configured otherwise). Use \
`Connect To Server` to target a different server or database.";

const COLLECTION: ArgSpec = ArgSpec::required("collection");
const QUERY: ArgSpec = ArgSpec::optional("query", "{}");
const DATABASE: ArgSpec = ArgSpec::required("database");

pub static KEYWORDS: &[KeywordSpec] = &[
    // Connection and databases
    KeywordSpec {
        name: "connect_to_server",
        args: &[
            ArgSpec::optional("host", "localhost"),
            ArgSpec::optional("port", "27017"),
            ArgSpec::optional("database", "robotdb"),
        ],
        doc: "Connects to a MongoDB server and selects a database.\n\n\
              Replaces any earlier connection.\n\n\
              Example:\n\
              | Connect To Server | mongo.example.com | 27017 | myDatabase |",
    },
    KeywordSpec {
        name: "disconnect_from_server",
        args: &[],
        doc: "Closes the current connection.\n\n\
              Database keywords fail until `Connect To Server` is called again.",
    },
    KeywordSpec {
        name: "use_database",
        args: &[DATABASE],
        doc: "Selects the database used by all following keywords.\n\n\
              Example:\n\
              | Use Database | myDatabase |",
    },
    KeywordSpec {
        name: "get_database_names",
        args: &[],
        doc: "Returns the names of all databases on the server.",
    },
    KeywordSpec {
        name: "get_collection_names",
        args: &[],
        doc: "Returns the names of all collections in the selected database.\n\n\
              Example:\n\
              | @{collections} | Get Collection Names |",
    },
    KeywordSpec {
        name: "drop_database",
        args: &[DATABASE],
        doc: "Drops the given database.\n\n\
              Example:\n\
              | Drop Database | myDatabase |",
    },
    // Collections
    KeywordSpec {
        name: "create_collection",
        args: &[COLLECTION],
        doc: "Creates a collection in the selected database.\n\n\
              Example:\n\
              | Create Collection | myCollection |",
    },
    KeywordSpec {
        name: "drop_collection",
        args: &[COLLECTION],
        doc: "Drops a collection with all its documents and indexes.\n\n\
              Example:\n\
              | Drop Collection | myCollection |",
    },
    KeywordSpec {
        name: "get_document_count",
        args: &[COLLECTION, QUERY],
        doc: "Returns the number of documents matching `query`.\n\n\
              Example:\n\
              | ${count} | Get Document Count | myCollection | {say : 'Hello MongoDB!'} |",
    },
    // Documents
    KeywordSpec {
        name: "insert_json_document_into_collection",
        args: &[COLLECTION, ArgSpec::required("json")],
        doc: "Inserts a JSON document and returns its `_id`.\n\n\
              Example:\n\
              | Insert Json Document Into Collection | myCollection | {say : 'Hello MongoDB!'} |",
    },
    KeywordSpec {
        name: "find_json_documents_in_collection",
        args: &[COLLECTION, QUERY],
        doc: "Returns all documents matching `query` as JSON strings.\n\n\
              Example:\n\
              | @{documents} | Find Json Documents In Collection | myCollection | {say : 'Hello MongoDB!'} |",
    },
    KeywordSpec {
        name: "find_one_json_document_in_collection",
        args: &[COLLECTION, QUERY],
        doc: "Returns the first document matching `query` as a JSON string, \
              or an empty string when nothing matches.",
    },
    KeywordSpec {
        name: "remove_json_documents_from_collection",
        args: &[COLLECTION, QUERY],
        doc: "Removes all documents matching `query` and returns how many were removed.\n\n\
              An empty query removes every document of the collection.\n\n\
              Example:\n\
              | Remove Json Documents From Collection | myCollection | {say : 'Hello MongoDB!'} |",
    },
    // Indexes
    KeywordSpec {
        name: "ensure_index",
        args: &[COLLECTION, ArgSpec::required("keys"), ArgSpec::optional("options", "{}")],
        doc: "Creates an index unless it exists and returns the index name.\n\n\
              `options` takes MongoDB index options such as `unique` or `name`.\n\n\
              Example:\n\
              | Ensure Index | myCollection | {email : 1} | {unique : true} |",
    },
    KeywordSpec {
        name: "get_index_names",
        args: &[COLLECTION],
        doc: "Returns the names of all indexes of a collection.",
    },
    KeywordSpec {
        name: "drop_index",
        args: &[COLLECTION, ArgSpec::required("index")],
        doc: "Drops an index by name.\n\n\
              Example:\n\
              | Drop Index | myCollection | email_1 |",
    },
    // Verification
    KeywordSpec {
        name: "database_should_exist",
        args: &[DATABASE],
        doc: "Fails unless the database exists on the server.",
    },
    KeywordSpec {
        name: "database_should_not_exist",
        args: &[DATABASE],
        doc: "Fails if the database exists on the server.",
    },
    KeywordSpec {
        name: "collection_should_exist",
        args: &[COLLECTION],
        doc: "Fails unless the collection exists in the selected database.",
    },
    KeywordSpec {
        name: "collection_should_not_exist",
        args: &[COLLECTION],
        doc: "Fails if the collection exists in the selected database.",
    },
    KeywordSpec {
        name: "document_count_should_be",
        args: &[COLLECTION, ArgSpec::required("expected"), QUERY],
        doc: "Fails unless exactly `expected` documents match `query`.\n\n\
              Example:\n\
              | Document Count Should Be | myCollection | 1 | {say : 'Hello MongoDB!'} |",
    },
    KeywordSpec {
        name: "collection_should_contain_document",
        args: &[COLLECTION, ArgSpec::required("query")],
        doc: "Fails unless at least one document matches `query`.",
    },
    KeywordSpec {
        name: "index_should_exist",
        args: &[COLLECTION, ArgSpec::required("index")],
        doc: "Fails unless the collection has an index with the given name.",
    },
    // Embedded server
    KeywordSpec {
        name: "start_embedded_mongodb",
        args: &[ArgSpec::optional("port", "")],
        doc: "Starts a throwaway local `mongod` and returns its port.\n\n\
              Without a port a free one is picked. The server stores its data \
              in a temporary directory that is removed on stop. Connect to it \
              with `Connect To Server`.\n\n\
              Example:\n\
              | ${port} | Start Embedded MongoDB |\n\
              | Connect To Server | localhost | ${port} |",
    },
    KeywordSpec {
        name: "stop_embedded_mongodb",
        args: &[],
        doc: "Stops the embedded `mongod` started by `Start Embedded MongoDB`.",
    },
];

/// Lowercase with spaces and underscores removed, so `Use Database`,
/// `use_database` and `useDatabase` are the same keyword.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ' ' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn find(name: &str) -> Option<&'static KeywordSpec> {
    let wanted = normalize(name);
    KEYWORDS.iter().find(|spec| normalize(spec.name) == wanted)
}

pub fn names() -> Vec<String> {
    KEYWORDS.iter().map(|spec| spec.name.to_string()).collect()
}
