//! A single tantivy index with its writer, reader and write overlay.

use std::collections::HashMap;
use std::fmt;

use search_sync_shared::{
    FieldDescriptor, FieldKind, IndexDocument, IndexSchema, MatchOperator, StructuredQuery,
};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, EmptyQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, FieldType, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED,
    STRING,
};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError, Term};
use tokio::sync::Mutex;

use crate::embedded::analysis::{
    exact_term, is_searchable_word, register_analyzers, EXACT_ANALYZER, STEMMED_ANALYZER,
};
use crate::errors::SearchIndexError;

/// Internal field holding the document id.
pub(crate) const DOC_ID_FIELD: &str = "_doc_id";

/// Heap of the single indexing thread of each writer.
const WRITER_HEAP_BYTES: usize = 20_000_000;

/// Build the tantivy schema of an index schema.
///
/// Every field is stored so partial updates can merge into the committed
/// document. Binary fields are stored only.
pub(crate) fn tantivy_schema(index_id: &str, schema: &IndexSchema) -> Result<Schema, SearchIndexError> {
    let mut builder = Schema::builder();
    builder.add_text_field(DOC_ID_FIELD, STRING | STORED);

    for field in schema.fields() {
        if field.name.is_empty() || field.name.starts_with('-') || field.name == DOC_ID_FIELD {
            return Err(SearchIndexError::configuration(format!(
                "Field name '{}' cannot be used in index '{}'",
                field.name, index_id
            )));
        }
        let options = match field.descriptor.kind {
            FieldKind::Binary => TextOptions::default().set_stored(),
            FieldKind::Text if field.descriptor.analyzed => {
                indexed(STEMMED_ANALYZER, IndexRecordOption::WithFreqsAndPositions)
            }
            _ => indexed(EXACT_ANALYZER, IndexRecordOption::WithFreqs),
        };
        builder.add_text_field(&field.name, options);
    }

    Ok(builder.build())
}

fn indexed(analyzer: &str, record: IndexRecordOption) -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(analyzer)
                .set_index_option(record),
        )
        .set_stored()
}

/// Rebuild an index schema from a tantivy schema, for indices whose schema
/// file is missing. Field kinds other than text, identifier and binary cannot
/// be told apart and come back as identifiers.
pub(crate) fn recover_schema(schema: &Schema) -> IndexSchema {
    let mut recovered = IndexSchema::new();
    for (_, entry) in schema.fields() {
        if entry.name() == DOC_ID_FIELD {
            continue;
        }
        let indexing = match entry.field_type() {
            FieldType::Str(options) => options.get_indexing_options(),
            _ => None,
        };
        let descriptor = match indexing {
            None => FieldDescriptor::plain(FieldKind::Binary).stored(),
            Some(indexing) if indexing.tokenizer() == STEMMED_ANALYZER => {
                FieldDescriptor::plain(FieldKind::Text)
                    .stored()
                    .analyzed()
            }
            Some(_) => FieldDescriptor::plain(FieldKind::Identifier).stored(),
        };
        recovered.insert(entry.name(), descriptor);
    }
    recovered
}

/// Map a tantivy error to the unified error type.
///
/// Lock and I/O failures are transient (another writer, a busy disk) and are
/// reported as an unavailable backend.
pub(crate) fn backend_error(context: &str, err: TantivyError) -> SearchIndexError {
    match &err {
        TantivyError::LockFailure(..) | TantivyError::IoError(_) => {
            SearchIndexError::unavailable(format!("{}: {}", context, err))
        }
        _ => SearchIndexError::index(format!("{}: {}", context, err)),
    }
}

/// Writer state. `pending` holds the latest uncommitted version of every
/// document written since the last commit (`None` for deletes).
struct WriteState {
    writer: IndexWriter,
    pending: HashMap<String, Option<IndexDocument>>,
}

pub(crate) struct EmbeddedIndex {
    name: String,
    schema: IndexSchema,
    index: Index,
    reader: IndexReader,
    id_field: Field,
    fields: HashMap<String, Field>,
    state: Mutex<WriteState>,
}

impl fmt::Debug for EmbeddedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedIndex")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl EmbeddedIndex {
    /// Take ownership of a created or opened tantivy index.
    ///
    /// Acquires the index writer, so only one `EmbeddedIndex` per index
    /// directory can exist at a time.
    pub(crate) fn load(
        name: impl Into<String>,
        index: Index,
        schema: IndexSchema,
    ) -> Result<Self, SearchIndexError> {
        let name = name.into();
        register_analyzers(&index);

        let tantivy_schema = index.schema();
        let id_field = tantivy_schema
            .get_field(DOC_ID_FIELD)
            .map_err(|e| SearchIndexError::schema_mismatch(&name, DOC_ID_FIELD, e.to_string()))?;
        let mut fields = HashMap::new();
        for field in schema.fields() {
            let handle = tantivy_schema
                .get_field(&field.name)
                .map_err(|e| SearchIndexError::schema_mismatch(&name, &field.name, e.to_string()))?;
            fields.insert(field.name.clone(), handle);
        }

        let writer = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| backend_error(&format!("Failed to open writer of index '{}'", name), e))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| backend_error(&format!("Failed to open reader of index '{}'", name), e))?;

        Ok(Self {
            name,
            schema,
            index,
            reader,
            id_field,
            fields,
            state: Mutex::new(WriteState {
                writer,
                pending: HashMap::new(),
            }),
        })
    }

    pub(crate) fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Number of committed documents.
    pub(crate) fn document_count(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    /// Number of documents written since the last commit.
    pub(crate) async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub(crate) fn validate(&self, document: &IndexDocument) -> Result<(), SearchIndexError> {
        if document.id.is_empty() {
            return Err(SearchIndexError::validation("Document id cannot be empty"));
        }
        for name in document.fields.keys() {
            if !self.schema.contains(name) {
                return Err(SearchIndexError::schema_mismatch(
                    &self.name,
                    name,
                    "field is not part of the index schema",
                ));
            }
        }
        Ok(())
    }

    /// Replace a document.
    pub(crate) async fn put(
        &self,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        self.validate(document)?;
        let mut state = self.state.lock().await;
        self.stage_put(&mut state, document.clone())?;
        if commit_now {
            self.commit(&mut state)?;
        }
        Ok(())
    }

    /// Merge the given fields into the latest version of a document.
    pub(crate) async fn partial_update(
        &self,
        document: &IndexDocument,
        commit_now: bool,
    ) -> Result<(), SearchIndexError> {
        self.validate(document)?;
        let mut state = self.state.lock().await;
        let mut merged = self
            .current(&state, &document.id)?
            .ok_or_else(|| SearchIndexError::document_not_found(&self.name, &document.id))?;
        merged.merge(document);

        self.stage_put(&mut state, merged)?;
        if commit_now {
            self.commit(&mut state)?;
        }
        Ok(())
    }

    pub(crate) async fn delete(&self, doc_id: &str, commit_now: bool) -> Result<(), SearchIndexError> {
        let mut state = self.state.lock().await;
        if self.current(&state, doc_id)?.is_none() {
            return Err(SearchIndexError::document_not_found(&self.name, doc_id));
        }

        state.writer.delete_term(self.id_term(doc_id));
        state.pending.insert(doc_id.to_string(), None);
        if commit_now {
            self.commit(&mut state)?;
        }
        Ok(())
    }

    /// Commit buffered writes and make them visible to queries.
    pub(crate) async fn refresh(&self) -> Result<(), SearchIndexError> {
        let mut state = self.state.lock().await;
        self.commit(&mut state)
    }

    fn stage_put(
        &self,
        state: &mut WriteState,
        document: IndexDocument,
    ) -> Result<(), SearchIndexError> {
        state.writer.delete_term(self.id_term(&document.id));
        state
            .writer
            .add_document(self.to_tantivy(&document))
            .map_err(|e| backend_error(&format!("Failed to index document '{}'", document.id), e))?;
        state.pending.insert(document.id.clone(), Some(document));
        Ok(())
    }

    fn commit(&self, state: &mut WriteState) -> Result<(), SearchIndexError> {
        state
            .writer
            .commit()
            .map_err(|e| backend_error(&format!("Failed to commit index '{}'", self.name), e))?;
        self.reader
            .reload()
            .map_err(|e| backend_error(&format!("Failed to reload index '{}'", self.name), e))?;
        state.pending.clear();
        Ok(())
    }

    /// The latest version of a document, including uncommitted writes.
    fn current(
        &self,
        state: &WriteState,
        doc_id: &str,
    ) -> Result<Option<IndexDocument>, SearchIndexError> {
        if let Some(pending) = state.pending.get(doc_id) {
            return Ok(pending.clone());
        }

        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.id_term(doc_id), IndexRecordOption::Basic);
        let hits = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| backend_error("Failed to look up document", e))?;
        let Some((_, address)) = hits.into_iter().next() else {
            return Ok(None);
        };
        let stored: TantivyDocument = searcher
            .doc(address)
            .map_err(|e| backend_error("Failed to load document", e))?;
        Ok(Some(self.from_tantivy(doc_id, &stored)))
    }

    fn id_term(&self, doc_id: &str) -> Term {
        Term::from_field_text(self.id_field, doc_id)
    }

    fn to_tantivy(&self, document: &IndexDocument) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_text(self.id_field, &document.id);
        for (name, value) in &document.fields {
            if let Some(field) = self.fields.get(name) {
                doc.add_text(*field, value);
            }
        }
        doc
    }

    fn from_tantivy(&self, doc_id: &str, stored: &TantivyDocument) -> IndexDocument {
        let mut document = IndexDocument::new(doc_id);
        for (name, field) in &self.fields {
            if let Some(value) = stored.get_first(*field).and_then(|v| v.as_str()) {
                document.insert(name.clone(), value);
            }
        }
        document
    }

    /// Run a query against committed documents.
    ///
    /// The query text is split on whitespace into words; words without any
    /// alphanumeric character are dropped. A word matches a document when, in
    /// at least one of the queried fields, all of its analyzed terms occur
    /// (text fields) or it equals the whole value (exact fields). Results are
    /// ranked by BM25 score, ties by id.
    pub(crate) fn search(
        &self,
        query: &StructuredQuery,
        limit: Option<usize>,
    ) -> Result<Vec<String>, SearchIndexError> {
        for field in &query.fields {
            if !self.schema.contains(field) {
                return Err(SearchIndexError::query(format!(
                    "Unknown field '{}' for index '{}'",
                    field, self.name
                )));
            }
        }

        let occur = match query.operator {
            MatchOperator::All => Occur::Must,
            MatchOperator::Any => Occur::Should,
        };
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for word in query.text.split_whitespace().filter(|w| is_searchable_word(w)) {
            clauses.push((occur, self.word_query(word, &query.fields)?));
        }
        if clauses.is_empty() || limit == Some(0) {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let candidates = (searcher.num_docs() as usize).max(1);
        let hits = searcher
            .search(&BooleanQuery::new(clauses), &TopDocs::with_limit(candidates))
            .map_err(|e| SearchIndexError::query(format!("Query on '{}' failed: {}", self.name, e)))?;

        let mut ranked = Vec::with_capacity(hits.len());
        for (score, address) in hits {
            let stored: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| backend_error("Failed to load document", e))?;
            if let Some(id) = stored.get_first(self.id_field).and_then(|v| v.as_str()) {
                ranked.push((score, id.to_string()));
            }
        }
        ranked.sort_by(|(a_score, a_id), (b_score, b_id)| {
            b_score.total_cmp(a_score).then_with(|| a_id.cmp(b_id))
        });

        let ids = ranked.into_iter().map(|(_, id)| id);
        Ok(match limit {
            Some(limit) => ids.take(limit).collect(),
            None => ids.collect(),
        })
    }

    /// Query matching one word in any of the fields.
    fn word_query(&self, word: &str, fields: &[String]) -> Result<Box<dyn Query>, SearchIndexError> {
        let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for name in fields {
            let (Some(descriptor), Some(field)) = (self.schema.get(name), self.fields.get(name))
            else {
                continue;
            };
            match descriptor.kind {
                FieldKind::Binary => {}
                FieldKind::Text if descriptor.analyzed => {
                    let terms = self.analyze(*field, word)?;
                    if terms.is_empty() {
                        continue;
                    }
                    let all_terms: Vec<(Occur, Box<dyn Query>)> = terms
                        .into_iter()
                        .map(|term| {
                            let query: Box<dyn Query> =
                                Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                            (Occur::Must, query)
                        })
                        .collect();
                    let all_terms: Box<dyn Query> = Box::new(BooleanQuery::new(all_terms));
                    per_field.push((Occur::Should, all_terms));
                }
                _ => {
                    if let Some(term) = exact_term(word) {
                        let exact: Box<dyn Query> = Box::new(TermQuery::new(
                            Term::from_field_text(*field, &term),
                            IndexRecordOption::WithFreqs,
                        ));
                        per_field.push((Occur::Should, exact));
                    }
                }
            }
        }

        if per_field.is_empty() {
            Ok(Box::new(EmptyQuery))
        } else {
            Ok(Box::new(BooleanQuery::new(per_field)))
        }
    }

    /// Terms of a word under a field's analyzer.
    fn analyze(&self, field: Field, word: &str) -> Result<Vec<Term>, SearchIndexError> {
        let mut analyzer = self
            .index
            .tokenizer_for_field(field)
            .map_err(|e| SearchIndexError::query(e.to_string()))?;
        let mut terms = Vec::new();
        analyzer
            .token_stream(word)
            .process(&mut |token| terms.push(Term::from_field_text(field, &token.text)));
        Ok(terms)
    }
}
